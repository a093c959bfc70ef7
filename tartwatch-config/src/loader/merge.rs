/// Recursively merge `overlay` into `base`.
///
/// Tables merge key by key; any other value in `overlay` replaces the one in
/// `base`.
pub fn merge_toml_values(base: &mut toml::Value, overlay: &toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) => {
            for (key, value) in overlay_table {
                match base_table.get_mut(key) {
                    Some(base_value) => merge_toml_values(base_value, value),
                    None => {
                        base_table.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (base, overlay) => {
            *base = overlay.clone();
        }
    }
}

/// Insert `value` at a dotted path such as `connection.base_delay_ms`,
/// creating intermediate tables and replacing non-table values on the way.
pub fn insert_dotted_key(table: &mut toml::Table, key: &str, value: toml::Value) {
    match key.split_once('.') {
        None => {
            table.insert(key.to_owned(), value);
        }
        Some((head, rest)) => {
            let entry = table
                .entry(head.to_owned())
                .or_insert_with(|| toml::Value::Table(toml::Table::new()));
            if !entry.is_table() {
                *entry = toml::Value::Table(toml::Table::new());
            }
            if let toml::Value::Table(child) = entry {
                insert_dotted_key(child, rest, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlay_tables_merge_recursively() {
        let mut base: toml::Value =
            toml::from_str("api_url = \"http://a\"\n[connection]\nbase_delay_ms = 10\n")
                .expect("parse");
        let overlay: toml::Value =
            toml::from_str("[connection]\nmax_reconnect_attempts = 2\n").expect("parse");
        merge_toml_values(&mut base, &overlay);

        let connection = base.get("connection").expect("connection table");
        assert_eq!(connection.get("base_delay_ms").and_then(toml::Value::as_integer), Some(10));
        assert_eq!(
            connection.get("max_reconnect_attempts").and_then(toml::Value::as_integer),
            Some(2)
        );
        assert_eq!(base.get("api_url").and_then(toml::Value::as_str), Some("http://a"));
    }

    #[test]
    fn dotted_keys_create_nested_tables() {
        let mut table = toml::Table::new();
        table.insert("retention".to_string(), toml::Value::Integer(1));
        insert_dotted_key(&mut table, "retention.blocks", toml::Value::Integer(900));
        insert_dotted_key(&mut table, "api_url", toml::Value::String("http://b".to_string()));

        let retention = table.get("retention").and_then(toml::Value::as_table).expect("table");
        assert_eq!(retention.get("blocks").and_then(toml::Value::as_integer), Some(900));
        assert_eq!(table.get("api_url").and_then(toml::Value::as_str), Some("http://b"));
    }
}
