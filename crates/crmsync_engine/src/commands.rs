//! Store command names and their argument lists.

use crmsync_model::{Account, Checkin, DataField, DataFieldValue, Route, UserProfile};
use crmsync_store::SqlValue;

/// Upserts a fully fetched account.
pub const MERGE_ACCOUNTS_DETAILED: &str = "MergeAccountsDetailed";
/// Upserts a check-in.
pub const MERGE_ACCOUNT_CHECKINS: &str = "MergeAccountCheckins";
/// Upserts a route.
pub const MERGE_ROUTES: &str = "MergeRoutes";
/// Upserts the user profile.
pub const MERGE_USER_PROFILES: &str = "MergeUserProfiles";
/// Writes one configuration key.
pub const UPDATE_CONFIGURATION: &str = "UpdateConfiguration";
/// Removes the data-field values of a profile.
pub const DELETE_DATA_SET_VALUES: &str = "DeleteDataSetValues";
/// Removes the data fields of a profile.
pub const DELETE_DATA_SETS: &str = "DeleteDataSets";
/// Inserts one data field.
pub const INSERT_DATA_SETS: &str = "InsertDataSets";
/// Inserts one data-field value.
pub const INSERT_DATA_SET_VALUES: &str = "InsertDataSetValues";

/// Every command name the engine issues. An executor must resolve all of
/// them for its dialect.
pub const REQUIRED_COMMANDS: [&str; 9] = [
    MERGE_ACCOUNTS_DETAILED,
    MERGE_ACCOUNT_CHECKINS,
    MERGE_ROUTES,
    MERGE_USER_PROFILES,
    UPDATE_CONFIGURATION,
    DELETE_DATA_SET_VALUES,
    DELETE_DATA_SETS,
    INSERT_DATA_SETS,
    INSERT_DATA_SET_VALUES,
];

/// Configuration key holding the profile id.
pub const CONFIG_PROFILE_ID: &str = "ApiProfileId";
/// Configuration key holding the profile display name.
pub const CONFIG_PROFILE_NAME: &str = "ApiProfileName";
/// Configuration key holding the company id.
pub const CONFIG_COMPANY_ID: &str = "CompanyId";
/// Configuration key holding the company name.
pub const CONFIG_COMPANY_NAME: &str = "CompanyName";

pub(crate) fn account_args(account: &Account) -> Vec<SqlValue> {
    let extra = serde_json::Value::Object(
        account
            .extra
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
    );
    vec![
        account.id.into(),
        account.first_name.clone().into(),
        account.last_name.clone().into(),
        account.full_name.clone().into(),
        account.phone_number.clone().into(),
        account.email.clone().into(),
        account.customer_id.clone().into(),
        account.notes.clone().into(),
        account.original_address.clone().into(),
        account.crm_id.clone().into(),
        account.account_owner.clone().into(),
        account.last_checkin_date.clone().into(),
        account.last_modified_date.clone().into(),
        account.follow_up_date.clone().into(),
        extra.to_string().into(),
    ]
}

pub(crate) fn checkin_args(checkin: &Checkin) -> Vec<SqlValue> {
    let extra_fields = checkin
        .extra_fields
        .as_ref()
        .map(|v| v.to_string())
        .unwrap_or_default();
    vec![
        checkin.id.into(),
        checkin.crm_id.clone().into(),
        checkin.customer.into(),
        checkin.log_datetime.clone().into(),
        checkin.checkin_type.clone().into(),
        checkin.comments.clone().into(),
        extra_fields.into(),
        checkin.created_by.clone().into(),
    ]
}

pub(crate) fn route_args(id: i64, route: &Route) -> Vec<SqlValue> {
    vec![
        id.into(),
        route.name.clone().into(),
        route.route_date.clone().into(),
        route.duration.into(),
        route.start_address.clone().into(),
        route.destination_address.clone().into(),
        route.start_time.clone().into(),
    ]
}

pub(crate) fn profile_args(profile: &UserProfile) -> Vec<SqlValue> {
    vec![
        profile.id.into(),
        profile.email.clone().into(),
        profile.first_name.clone().into(),
        profile.last_name.clone().into(),
        profile.is_manager.into(),
        profile.crm_editable_fields_list.join(",").into(),
        profile.crm_base_url.clone().into(),
        profile.crm_type.clone().into(),
        profile.company.id.into(),
        profile.company.name.clone().into(),
        profile.company.short_name.clone().into(),
    ]
}

/// Key/value pairs written to the configuration table after a profile pull.
pub(crate) fn profile_configuration(profile: &UserProfile) -> [(&'static str, String); 4] {
    [
        (CONFIG_PROFILE_ID, profile.id.to_string()),
        (CONFIG_PROFILE_NAME, profile.display_name()),
        (CONFIG_COMPANY_ID, profile.company.id.to_string()),
        (CONFIG_COMPANY_NAME, profile.company.name.clone()),
    ]
}

pub(crate) fn data_set_args(profile_id: i64, field: &DataField) -> Vec<SqlValue> {
    vec![
        field.name.clone().into(),
        profile_id.into(),
        field.filterable.into(),
        field.label.clone().into(),
        field.position.into(),
        field.field_type.clone().into(),
        field.has_data.into(),
        field.account_field.clone().into(),
    ]
}

pub(crate) fn data_set_value_args(
    profile_id: i64,
    field: &DataField,
    value: &DataFieldValue,
) -> Vec<SqlValue> {
    vec![
        profile_id.into(),
        field.name.clone().into(),
        value.text.clone().into(),
        value.value.clone().into(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn required_commands_are_unique() {
        let unique: HashSet<_> = REQUIRED_COMMANDS.iter().collect();
        assert_eq!(unique.len(), REQUIRED_COMMANDS.len());
    }

    #[test]
    fn account_args_carry_extra_fields() {
        let account: Account =
            serde_json::from_str(r#"{"id":4,"full_name":"Acme","custom_text1":"gold"}"#).unwrap();
        let args = account_args(&account);
        assert_eq!(args[0], SqlValue::Int(4));
        assert_eq!(args[3], SqlValue::Text("Acme".into()));
        assert_eq!(args[1], SqlValue::Null);
        assert_eq!(
            args.last().and_then(SqlValue::as_text),
            Some(r#"{"custom_text1":"gold"}"#)
        );
    }

    #[test]
    fn checkin_args_render_extra_fields_as_text() {
        let checkin = Checkin {
            id: 1,
            customer: 2,
            extra_fields: Some(serde_json::json!({"mood": "good"})),
            ..Checkin::default()
        };
        let args = checkin_args(&checkin);
        assert_eq!(args[2], SqlValue::Int(2));
        assert_eq!(args[6], SqlValue::Text(r#"{"mood":"good"}"#.into()));
    }

    #[test]
    fn profile_configuration_keys() {
        let mut profile = UserProfile {
            id: 12,
            first_name: Some("Ada".into()),
            last_name: Some("Lovelace".into()),
            ..UserProfile::default()
        };
        profile.company.id = 3;
        profile.company.name = "Engines Ltd".into();

        let pairs = profile_configuration(&profile);
        assert_eq!(pairs[0], (CONFIG_PROFILE_ID, "12".to_string()));
        assert_eq!(pairs[1], (CONFIG_PROFILE_NAME, "Ada Lovelace".to_string()));
        assert_eq!(pairs[3], (CONFIG_COMPANY_NAME, "Engines Ltd".to_string()));
    }
}
