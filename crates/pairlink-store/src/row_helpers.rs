use crate::error::StoreError;

/// Parse a string column into an enum, returning CorruptRow on failure.
pub fn parse_enum<T: std::str::FromStr>(
    raw: &str,
    table: &'static str,
    column: &'static str,
) -> Result<T, StoreError> {
    raw.parse().map_err(|_| StoreError::CorruptRow {
        table,
        column,
        detail: format!("unknown variant: {raw}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pairlink_core::collaborators::ConnectionStatus;
    use pairlink_core::Role;

    #[test]
    fn parse_enum_success() {
        let role: Role = parse_enum("esp", "connections", "device_type").unwrap();
        assert_eq!(role, Role::Device);
        let status: ConnectionStatus = parse_enum("connected", "connections", "status").unwrap();
        assert_eq!(status, ConnectionStatus::Connected);
    }

    #[test]
    fn parse_enum_failure() {
        let result: Result<Role, _> = parse_enum("toaster", "connections", "device_type");
        assert!(matches!(
            result,
            Err(StoreError::CorruptRow { table: "connections", column: "device_type", .. })
        ));
    }
}
