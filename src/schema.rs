//! Read-only relational schema model bound into templates as property values.
//!
//! Database introspection happens elsewhere; this module only reads the XML
//! description it produces:
//!
//! ```xml
//! <database name="Shop">
//!   <table name="Orders">
//!     <column name="Id" dataType="Int32" isIdentity="true"/>
//!     <column name="CustomerId" dataType="Int32"/>
//!     <primaryKey name="PK_Orders"><member column="Id"/></primaryKey>
//!     <foreignKey name="FK_Orders_Customers" foreignTable="Customers">
//!       <member column="CustomerId" foreignColumn="Id"/>
//!     </foreignKey>
//!   </table>
//! </database>
//! ```
//!
//! Templates see snake_case tables with derived views (`primary_key_columns`,
//! `non_key_columns`, `is_foreign_key_member`, ...).

use mlua::{Lua, LuaSerdeExt, SerializeOptions, Value};
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("invalid schema XML: {0}")]
    Xml(#[from] quick_xml::DeError),

    #[error("cannot convert schema to a Lua value: {0}")]
    Lua(#[from] mlua::Error),
}

/// Which schema object a property holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaKind {
    Database,
    Table,
}

impl std::fmt::Display for SchemaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchemaKind::Database => write!(f, "database schema"),
            SchemaKind::Table => write!(f, "table schema"),
        }
    }
}

// =========================================================================
// XML model
// =========================================================================

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Database {
    #[serde(rename = "@name")]
    pub name: String,
    #[serde(rename = "table", default)]
    pub tables: Vec<Table>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Table {
    #[serde(rename = "@name")]
    pub name: String,
    #[serde(rename = "@owner", default)]
    pub owner: Option<String>,
    #[serde(rename = "column", default)]
    pub columns: Vec<Column>,
    #[serde(rename = "index", default)]
    pub indexes: Vec<Index>,
    #[serde(rename = "primaryKey", default)]
    pub primary_key: Option<PrimaryKey>,
    #[serde(rename = "foreignKey", default)]
    pub foreign_keys: Vec<ForeignKey>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Column {
    #[serde(rename = "@name")]
    pub name: String,
    #[serde(rename = "@dataType", default)]
    pub data_type: String,
    #[serde(rename = "@nativeType", default)]
    pub native_type: String,
    #[serde(rename = "@size", default)]
    pub size: Option<i64>,
    #[serde(rename = "@precision", default)]
    pub precision: Option<u8>,
    #[serde(rename = "@scale", default)]
    pub scale: Option<u8>,
    #[serde(rename = "@allowDBNull", default)]
    pub allow_db_null: bool,
    #[serde(rename = "@isIdentity", default)]
    pub is_identity: bool,
    #[serde(rename = "@description", default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Member {
    #[serde(rename = "@column")]
    pub column: String,
    #[serde(rename = "@foreignColumn", default)]
    pub foreign_column: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Index {
    #[serde(rename = "@name")]
    pub name: String,
    #[serde(rename = "@isPrimaryKey", default)]
    pub is_primary_key: bool,
    #[serde(rename = "@isUnique", default)]
    pub is_unique: bool,
    #[serde(rename = "@isClustered", default)]
    pub is_clustered: bool,
    #[serde(rename = "member", default)]
    pub members: Vec<Member>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PrimaryKey {
    #[serde(rename = "@name", default)]
    pub name: String,
    #[serde(rename = "member", default)]
    pub members: Vec<Member>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ForeignKey {
    #[serde(rename = "@name", default)]
    pub name: String,
    #[serde(rename = "@foreignTable")]
    pub foreign_table: String,
    #[serde(rename = "member", default)]
    pub members: Vec<Member>,
}

impl Database {
    pub fn from_xml(xml: &str) -> Result<Self, SchemaError> {
        Ok(quick_xml::de::from_str(xml.trim())?)
    }
}

impl Table {
    pub fn from_xml(xml: &str) -> Result<Self, SchemaError> {
        Ok(quick_xml::de::from_str(xml.trim())?)
    }

    fn is_primary_key_member(&self, column: &str) -> bool {
        self.primary_key
            .as_ref()
            .is_some_and(|pk| pk.members.iter().any(|m| m.column == column))
    }

    fn is_foreign_key_member(&self, column: &str) -> bool {
        self.foreign_keys
            .iter()
            .any(|fk| fk.members.iter().any(|m| m.column == column))
    }

    /// Member of a single-column unique index.
    fn is_unique(&self, column: &str) -> bool {
        self.indexes
            .iter()
            .any(|ix| ix.is_unique && ix.members.len() == 1 && ix.members[0].column == column)
    }
}

// =========================================================================
// Template views
// =========================================================================

#[derive(Debug, Clone, Serialize)]
struct ColumnView {
    name: String,
    data_type: String,
    native_type: String,
    size: Option<i64>,
    precision: Option<u8>,
    scale: Option<u8>,
    allow_db_null: bool,
    is_identity: bool,
    description: Option<String>,
    is_primary_key_member: bool,
    is_foreign_key_member: bool,
    is_unique: bool,
}

#[derive(Debug, Clone, Serialize)]
struct IndexView {
    name: String,
    is_primary_key: bool,
    is_unique: bool,
    is_clustered: bool,
    member_columns: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
struct KeyView {
    name: String,
    kind: &'static str,
    member_columns: Vec<String>,
    foreign_table: Option<String>,
    foreign_member_columns: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
struct TableView {
    name: String,
    owner: Option<String>,
    columns: Vec<ColumnView>,
    indexes: Vec<IndexView>,
    primary_key: Option<KeyView>,
    foreign_keys: Vec<KeyView>,
    primary_key_columns: Vec<ColumnView>,
    non_primary_key_columns: Vec<ColumnView>,
    non_key_columns: Vec<ColumnView>,
    keys: Vec<KeyView>,
    has_identity: bool,
}

#[derive(Debug, Clone, Serialize)]
struct DatabaseView {
    name: String,
    tables: Vec<TableView>,
}

fn member_columns(members: &[Member]) -> Vec<String> {
    members.iter().map(|m| m.column.clone()).collect()
}

impl From<&Table> for TableView {
    fn from(table: &Table) -> Self {
        let columns: Vec<ColumnView> = table
            .columns
            .iter()
            .map(|c| ColumnView {
                name: c.name.clone(),
                data_type: c.data_type.clone(),
                native_type: c.native_type.clone(),
                size: c.size,
                precision: c.precision,
                scale: c.scale,
                allow_db_null: c.allow_db_null,
                is_identity: c.is_identity,
                description: c.description.clone(),
                is_primary_key_member: table.is_primary_key_member(&c.name),
                is_foreign_key_member: table.is_foreign_key_member(&c.name),
                is_unique: table.is_unique(&c.name),
            })
            .collect();

        let primary_key = table.primary_key.as_ref().map(|pk| KeyView {
            name: pk.name.clone(),
            kind: "primary",
            member_columns: member_columns(&pk.members),
            foreign_table: None,
            foreign_member_columns: Vec::new(),
        });
        let foreign_keys: Vec<KeyView> = table
            .foreign_keys
            .iter()
            .map(|fk| KeyView {
                name: fk.name.clone(),
                kind: "foreign",
                member_columns: member_columns(&fk.members),
                foreign_table: Some(fk.foreign_table.clone()),
                foreign_member_columns: fk
                    .members
                    .iter()
                    .map(|m| m.foreign_column.clone().unwrap_or_else(|| m.column.clone()))
                    .collect(),
            })
            .collect();

        let keys = primary_key
            .iter()
            .chain(foreign_keys.iter())
            .cloned()
            .collect();
        let select = |keep: fn(&ColumnView) -> bool| -> Vec<ColumnView> {
            columns.iter().filter(|c| keep(c)).cloned().collect()
        };

        TableView {
            name: table.name.clone(),
            owner: table.owner.clone(),
            primary_key_columns: select(|c| c.is_primary_key_member),
            non_primary_key_columns: select(|c| !c.is_primary_key_member),
            non_key_columns: select(|c| !c.is_primary_key_member && !c.is_foreign_key_member),
            has_identity: columns.iter().any(|c| c.is_identity),
            indexes: table
                .indexes
                .iter()
                .map(|ix| IndexView {
                    name: ix.name.clone(),
                    is_primary_key: ix.is_primary_key,
                    is_unique: ix.is_unique,
                    is_clustered: ix.is_clustered,
                    member_columns: member_columns(&ix.members),
                })
                .collect(),
            columns,
            primary_key,
            foreign_keys,
            keys,
        }
    }
}

/// Read a schema document and convert it to the Lua value templates see.
pub fn to_lua(lua: &Lua, kind: SchemaKind, xml: &str) -> Result<Value, SchemaError> {
    let options = SerializeOptions::new().serialize_none_to_null(false);
    let value = match kind {
        SchemaKind::Database => {
            let database = Database::from_xml(xml)?;
            let view = DatabaseView {
                name: database.name.clone(),
                tables: database.tables.iter().map(TableView::from).collect(),
            };
            lua.to_value_with(&view, options)?
        }
        SchemaKind::Table => {
            let table = Table::from_xml(xml)?;
            lua.to_value_with(&TableView::from(&table), options)?
        }
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHOP: &str = r#"
        <database name="Shop">
          <table name="Orders" owner="dbo">
            <column name="Id" dataType="Int32" isIdentity="true"/>
            <column name="CustomerId" dataType="Int32"/>
            <column name="Reference" dataType="String" size="32"/>
            <index name="IX_Reference" isUnique="true"><member column="Reference"/></index>
            <column name="Notes" dataType="String" allowDBNull="true"/>
            <primaryKey name="PK_Orders"><member column="Id"/></primaryKey>
            <foreignKey name="FK_Orders_Customers" foreignTable="Customers">
              <member column="CustomerId" foreignColumn="Id"/>
            </foreignKey>
          </table>
          <table name="Customers">
            <column name="Id" dataType="Int32"/>
          </table>
        </database>"#;

    #[test]
    fn test_parse_database() {
        let db = Database::from_xml(SHOP).unwrap();
        assert_eq!(db.name, "Shop");
        assert_eq!(db.tables.len(), 2);
        let orders = &db.tables[0];
        assert_eq!(orders.columns.len(), 4);
        assert_eq!(orders.columns[2].size, Some(32));
        assert!(orders.columns[3].allow_db_null);
        assert_eq!(orders.foreign_keys[0].foreign_table, "Customers");
        assert_eq!(
            orders.foreign_keys[0].members[0].foreign_column.as_deref(),
            Some("Id")
        );
    }

    #[test]
    fn test_derived_views() {
        let db = Database::from_xml(SHOP).unwrap();
        let view = TableView::from(&db.tables[0]);
        let names = |cols: &[ColumnView]| cols.iter().map(|c| c.name.clone()).collect::<Vec<_>>();
        assert_eq!(names(&view.primary_key_columns), vec!["Id"]);
        assert_eq!(
            names(&view.non_primary_key_columns),
            vec!["CustomerId", "Reference", "Notes"]
        );
        assert_eq!(names(&view.non_key_columns), vec!["Reference", "Notes"]);
        assert!(view.columns[2].is_unique);
        assert!(view.columns[1].is_foreign_key_member);
        assert!(view.has_identity);
        let kinds: Vec<_> = view.keys.iter().map(|k| k.kind).collect();
        assert_eq!(kinds, vec!["primary", "foreign"]);
    }

    #[test]
    fn test_lua_value() {
        let lua = Lua::new();
        let value = to_lua(&lua, SchemaKind::Database, SHOP).unwrap();
        lua.globals().set("db", value).unwrap();
        let name: String = lua
            .load("return db.tables[1].primary_key_columns[1].name")
            .eval()
            .unwrap();
        assert_eq!(name, "Id");
        let count: i64 = lua.load("return #db.tables[1].non_key_columns").eval().unwrap();
        assert_eq!(count, 2);
        let missing: bool = lua
            .load("return db.tables[2].primary_key == nil")
            .eval()
            .unwrap();
        assert!(missing);
    }

    #[test]
    fn test_single_table() {
        let lua = Lua::new();
        let value = to_lua(
            &lua,
            SchemaKind::Table,
            r#"<table name="Tags"><column name="Label"/></table>"#,
        )
        .unwrap();
        let table = value.as_table().unwrap();
        assert_eq!(table.get::<String>("name").unwrap(), "Tags");
    }

    #[test]
    fn test_invalid_schema() {
        let lua = Lua::new();
        assert!(matches!(
            to_lua(&lua, SchemaKind::Table, "<table>"),
            Err(SchemaError::Xml(_))
        ));
    }
}
