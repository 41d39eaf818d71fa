//! Reading and writing the XML mod catalog.

use super::types::{CatalogError, Mod, ModChain, ModGuard, Step, StepType};
use std::fmt;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Load mods from an XML file.
pub fn load_mods(path: &Path) -> Result<Vec<Mod>, CatalogError> {
    let xml = fs::read_to_string(path)?;
    let mods = parse_mods(&xml)?;
    debug!(path = %path.display(), count = mods.len(), "Loaded mods file");
    Ok(mods)
}

/// Parse a `<mods>` document.
///
/// Attribute values and text are trimmed. `mod` step directives are
/// validated here so a bad chain fails the load instead of the run.
pub fn parse_mods(xml: &str) -> Result<Vec<Mod>, CatalogError> {
    let doc = roxmltree::Document::parse(xml)?;
    let root = doc.root_element();
    if root.tag_name().name() != "mods" {
        return Err(CatalogError::MissingRoot);
    }

    let mods = child_elements(root, "mod")
        .map(parse_mod)
        .collect::<Result<Vec<_>, _>>()?;

    if mods.is_empty() {
        return Err(CatalogError::NoMods);
    }
    Ok(mods)
}

fn parse_mod(node: roxmltree::Node) -> Result<Mod, CatalogError> {
    let attr = |name: &str| node.attribute(name).unwrap_or("").trim().to_string();
    let opt_attr = |name: &str| {
        node.attribute(name)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };

    let mut m = Mod {
        author: attr("author"),
        from: attr("from"),
        from_minor: attr("fminor"),
        to: attr("to"),
        to_minor: attr("tminor"),
        date: attr("date"),
        comment: child_elements(node, "comment")
            .next()
            .map(text_of)
            .unwrap_or_default(),
        schema: 0,
        guard: ModGuard {
            if_table_exists: opt_attr("ifTableExists"),
            if_column_exists: opt_attr("ifColumnExists"),
            if_table_not_exists: opt_attr("ifTableNotExists"),
            if_column_not_exists: opt_attr("ifColumnNotExists"),
        },
        steps: Vec::new(),
    };

    let schema = attr("schema");
    if !schema.is_empty() {
        m.schema = schema
            .parse()
            .map_err(|_| CatalogError::InvalidSchema(schema.clone(), m.transition().to_string()))?;
    }

    for steps in child_elements(node, "steps") {
        for step in child_elements(steps, "step") {
            let step_type = StepType::parse(step.attribute("type").unwrap_or(""));
            let content = text_of(step);
            if step_type == StepType::Mod {
                ModChain::parse(&content)?;
            }
            m.steps.push(Step::new(step_type, content));
        }
    }

    Ok(m)
}

fn child_elements<'a, 'input: 'a>(
    node: roxmltree::Node<'a, 'input>,
    name: &'a str,
) -> impl Iterator<Item = roxmltree::Node<'a, 'input>> + 'a {
    node.children()
        .filter(move |c| c.is_element() && c.tag_name().name() == name)
}

/// All descendant text (including CDATA), trimmed.
fn text_of(node: roxmltree::Node) -> String {
    node.descendants()
        .filter(|n| n.is_text())
        .filter_map(|n| n.text())
        .collect::<String>()
        .trim()
        .to_string()
}

/// Escape text for use in XML content or attribute values.
pub fn escape_xml(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

impl fmt::Display for Mod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<mod author=\"{}\" from=\"{}\" fminor=\"{}\" to=\"{}\" tminor=\"{}\" date=\"{}\" schema=\"{}\"",
            escape_xml(&self.author),
            escape_xml(&self.from),
            escape_xml(&self.from_minor),
            escape_xml(&self.to),
            escape_xml(&self.to_minor),
            escape_xml(&self.date),
            self.schema
        )?;
        let guards = [
            ("ifTableExists", &self.guard.if_table_exists),
            ("ifColumnExists", &self.guard.if_column_exists),
            ("ifTableNotExists", &self.guard.if_table_not_exists),
            ("ifColumnNotExists", &self.guard.if_column_not_exists),
        ];
        for (name, value) in guards {
            if let Some(value) = value {
                write!(f, " {}=\"{}\"", name, escape_xml(value))?;
            }
        }
        writeln!(f, ">")?;
        writeln!(f, "  <comment>{}</comment>", escape_xml(&self.comment))?;
        writeln!(f, "  <steps>")?;
        for step in &self.steps {
            writeln!(
                f,
                "    <step type=\"{}\">{}</step>",
                escape_xml(step.step_type.as_str()),
                escape_xml(&step.content)
            )?;
        }
        writeln!(f, "  </steps>")?;
        write!(f, "</mod>")
    }
}

/// Serialize mods back into a `<mods>` document.
pub fn mods_to_xml<'a, I>(mods: I) -> String
where
    I: IntoIterator<Item = &'a Mod>,
{
    let mut out = String::from("<mods>\n");
    for m in mods {
        out.push_str(&m.to_string());
        out.push('\n');
    }
    out.push_str("</mods>\n");
    out
}
