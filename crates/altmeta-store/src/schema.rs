//! SQL table definition for relational deployments.
//!
//! The redb store creates its own tables on open; this renders the
//! equivalent MySQL DDL for hosts that keep metadata in a SQL database.
//! The statement is idempotent (`CREATE TABLE IF NOT EXISTS`).

use crate::registry::{MetaTable, TableRegistry};

/// Length of the indexed `meta_key` prefix (utf8mb4 index limit)
pub const META_KEY_INDEX_PREFIX: usize = 191;

/// Maximum `meta_key` length
pub const META_KEY_MAX_LEN: usize = 255;

/// `CREATE TABLE` statement for one meta table
#[must_use]
pub fn create_table_sql(table: &MetaTable) -> String {
    let name = table.name();
    let id_column = table.id_column();
    format!(
        "CREATE TABLE IF NOT EXISTS `{name}` (\n\
         \t`meta_id` bigint(20) unsigned NOT NULL AUTO_INCREMENT,\n\
         \t`{id_column}` bigint(20) unsigned NOT NULL DEFAULT '0',\n\
         \t`meta_key` varchar({META_KEY_MAX_LEN}) COLLATE utf8mb4_unicode_ci DEFAULT NULL,\n\
         \t`meta_value` longtext COLLATE utf8mb4_unicode_ci,\n\
         \tPRIMARY KEY (`meta_id`),\n\
         \tKEY `{id_column}` (`{id_column}`),\n\
         \tKEY `meta_key` (`meta_key`({META_KEY_INDEX_PREFIX}))\n\
         ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci;\n"
    )
}

/// DDL for every table in the registry, in meta type order
#[must_use]
pub fn create_all_sql(registry: &TableRegistry) -> String {
    registry
        .tables()
        .map(create_table_sql)
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> TableRegistry {
        TableRegistry::builder("wp_")
            .register("widget")
            .unwrap()
            .register("post")
            .unwrap()
            .build()
    }

    #[test]
    fn test_create_table_sql() {
        let registry = registry();
        let sql = create_table_sql(registry.resolve("widget").unwrap());
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS `wp_widgetmeta`"));
        assert!(sql.contains("`widget_id` bigint(20) unsigned NOT NULL DEFAULT '0'"));
        assert!(sql.contains("`meta_key` varchar(255)"));
        assert!(sql.contains("KEY `meta_key` (`meta_key`(191))"));
        assert!(sql.contains("KEY `widget_id` (`widget_id`)"));
        assert!(sql.contains("PRIMARY KEY (`meta_id`)"));
    }

    #[test]
    fn test_create_all_sql() {
        let sql = create_all_sql(&registry());
        let post = sql.find("`wp_postmeta`").unwrap();
        let widget = sql.find("`wp_widgetmeta`").unwrap();
        assert!(post < widget);
    }
}
