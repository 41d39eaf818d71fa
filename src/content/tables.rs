//! Built-in content tables.

use crate::reconciliation::{TableDefinition, XmlColumnAlias};

pub const SETTING_CATEGORIES_XML: &str = "dbsettingcategories.xml";
pub const SCOPES_XML: &str = "dbscopes.xml";
pub const SETTING_DEFINITIONS_XML: &str = "dbsettingdefinitions.xml";
pub const SETTING_GROUPS_XML: &str = "dbsettinggroups.xml";
pub const SCHEDULES_XML: &str = "dbschedules.xml";
pub const HEALTH_ALERT_TYPES_XML: &str = "dbhealthalerttypes.xml";

/// Scope `type` of scopes created by users. Those rows are never reconciled.
pub const USER_DEFINED_SCOPE_TYPE: &str = "2";

/// Setting definition column defaulted to empty when content leaves it out.
pub const LICENSE_VALUE_COLUMN: &str = "licenseVal";

/// Start and end of the schedule time given to schedules that have none.
pub const DEFAULT_SCHEDULE_TIME: (&str, &str) = ("00:00:00", "7.00:00:00");

pub fn setting_categories() -> TableDefinition {
    TableDefinition::new("settingcategories", "/settingcategories/row")
        .unique(&["name"])
        .ignore("settings")
}

/// Settings are declared inside their category.
pub fn settings() -> TableDefinition {
    TableDefinition::new("settings", "/settingcategories/row/settings/row")
        .unique(&["name"])
        .alias(
            "category",
            XmlColumnAlias::new(
                "settingCategoryId",
                "name",
                "settingcategories",
                "settingCategoryId",
            ),
        )
        .alias(
            "scope",
            XmlColumnAlias::new("scopeId", "name", "scopes", "scopeId"),
        )
}

/// One definition per setting and channel driver. The channel driver may be
/// left out.
pub fn setting_definitions() -> TableDefinition {
    TableDefinition::new("settingdefinitions", "/settingdefinitions/row")
        .unique(&["name", "channelDriver"])
        .alias(
            "name",
            XmlColumnAlias::new("settingId", "name", "settings", "settingId"),
        )
        .alias(
            "channelDriver",
            XmlColumnAlias::new("channelDriverId", "name", "channeldrivers", "channelDriverId"),
        )
        .ignore("update_policy")
}

pub fn scopes() -> TableDefinition {
    TableDefinition::new("scopes", "/scopes/row")
        .unique(&["name"])
        .ignore("key")
        .ignore("references")
        .ignore("where")
        .ignore("channeldriverkey")
}

pub fn setting_groups() -> TableDefinition {
    TableDefinition::new("settinggroups", "/settinggroups/row")
        .unique(&["name"])
        .ignore("settinggroupsettings")
}

/// Group membership is declared inside the group.
pub fn setting_group_settings() -> TableDefinition {
    TableDefinition::new(
        "settinggroupsettings",
        "/settinggroups/row/settinggroupsettings/row",
    )
    .unique(&["group", "name"])
    .alias(
        "group",
        XmlColumnAlias::new("settingGroupId", "name", "settinggroups", "settingGroupId"),
    )
    .alias(
        "name",
        XmlColumnAlias::new("settingId", "name", "settings", "settingId"),
    )
}

pub fn schedules() -> TableDefinition {
    TableDefinition::new("schedules", "/schedules/row")
        .unique(&["name"])
        .alias(
            "settingGroup",
            XmlColumnAlias::new("settinggroupId", "name", "settinggroups", "settinggroupId"),
        )
        .alias(
            "valueset",
            XmlColumnAlias::new("valuesetid", "name", "valuesets", "valuesetid"),
        )
}

pub fn health_alert_types() -> TableDefinition {
    TableDefinition::new("healthalerttypes", "/healthalerttypes/row").unique(&["name"])
}
