//! Catalog queries. `@P1` is always the bracket-quoted `[schema].[object]` name
//! unless noted otherwise.

pub const COLUMNS: &str = r#"
SELECT c.name AS column_name,
       t.name AS type_name,
       c.max_length,
       c.precision,
       c.scale,
       c.is_nullable,
       c.is_identity,
       OBJECT_DEFINITION(c.default_object_id) AS default_definition,
       c.is_computed,
       cc.definition AS computed_definition
FROM sys.columns c
LEFT JOIN sys.computed_columns cc ON cc.object_id = c.object_id AND cc.column_id = c.column_id
JOIN sys.types t ON c.user_type_id = t.user_type_id
WHERE c.object_id = OBJECT_ID(@P1)
ORDER BY c.column_id
"#;

pub const DEFAULT_CONSTRAINTS: &str = r#"
SELECT col.name AS column_name,
       dc.name AS constraint_name,
       OBJECT_DEFINITION(dc.object_id) AS definition
FROM sys.default_constraints dc
JOIN sys.columns col ON dc.parent_object_id = col.object_id AND dc.parent_column_id = col.column_id
WHERE dc.parent_object_id = OBJECT_ID(@P1)
"#;

pub const INDEXES: &str = r#"
SELECT i.name AS index_name,
       i.is_unique,
       (SELECT '[' + c.name + ']' + CASE WHEN ic.is_descending_key = 1 THEN ' DESC' ELSE '' END + ','
          FROM sys.index_columns ic
          JOIN sys.columns c ON ic.object_id = c.object_id AND ic.column_id = c.column_id
         WHERE ic.object_id = i.object_id AND ic.index_id = i.index_id AND ic.is_included_column = 0
         ORDER BY ic.key_ordinal
           FOR XML PATH('')) AS key_columns,
       (SELECT '[' + c.name + '],'
          FROM sys.index_columns ic
          JOIN sys.columns c ON ic.object_id = c.object_id AND ic.column_id = c.column_id
         WHERE ic.object_id = i.object_id AND ic.index_id = i.index_id AND ic.is_included_column = 1
           FOR XML PATH('')) AS included_columns
FROM sys.indexes i
WHERE i.object_id = OBJECT_ID(@P1)
  AND i.is_primary_key = 0
  AND i.is_hypothetical = 0
  AND i.name IS NOT NULL
ORDER BY i.index_id
"#;

pub const PRIMARY_KEY: &str = r#"
SELECT kc.name AS constraint_name,
       (SELECT '[' + c.name + '],'
          FROM sys.index_columns ic
          JOIN sys.columns c ON ic.object_id = c.object_id AND ic.column_id = c.column_id
         WHERE ic.object_id = kc.parent_object_id AND ic.index_id = kc.unique_index_id
         ORDER BY ic.key_ordinal
           FOR XML PATH('')) AS pk_columns
FROM sys.key_constraints kc
WHERE kc.parent_object_id = OBJECT_ID(@P1) AND kc.type = 'PK'
"#;

pub const CHECK_CONSTRAINTS: &str = r#"
SELECT cc.name AS constraint_name, OBJECT_DEFINITION(cc.object_id) AS definition
FROM sys.check_constraints cc
WHERE cc.parent_object_id = OBJECT_ID(@P1)
ORDER BY cc.name
"#;

pub const TRIGGERS: &str = r#"
SELECT tr.name AS trigger_name, OBJECT_DEFINITION(tr.object_id) AS definition
FROM sys.triggers tr
WHERE tr.parent_id = OBJECT_ID(@P1) AND tr.is_ms_shipped = 0
ORDER BY tr.name
"#;

pub const DEPENDENCIES: &str = r#"
SELECT referenced_schema_name, referenced_entity_name, referenced_class_desc
FROM sys.sql_expression_dependencies
WHERE referencing_id = OBJECT_ID(@P1)
"#;

pub const DEFINITION: &str = "SELECT OBJECT_DEFINITION(OBJECT_ID(@P1)) AS definition";

pub const OBJECTS: &str = r#"
SELECT 'TABLE' AS object_type, s.name AS schema_name, t.name AS object_name, NULL AS parent_name
FROM sys.tables t JOIN sys.schemas s ON t.schema_id = s.schema_id
UNION ALL
SELECT 'VIEW', s.name, v.name, NULL
FROM sys.views v JOIN sys.schemas s ON v.schema_id = s.schema_id
UNION ALL
SELECT 'PROCEDURE', s.name, p.name, NULL
FROM sys.procedures p JOIN sys.schemas s ON p.schema_id = s.schema_id
UNION ALL
SELECT 'FUNCTION', s.name, o.name, NULL
FROM sys.objects o JOIN sys.schemas s ON o.schema_id = s.schema_id
WHERE o.type IN ('FN', 'IF', 'TF', 'FS', 'FT')
UNION ALL
SELECT 'TRIGGER', s.name, tr.name, t.name
FROM sys.triggers tr
JOIN sys.tables t ON tr.parent_id = t.object_id
JOIN sys.schemas s ON t.schema_id = s.schema_id
UNION ALL
SELECT 'INDEX', s.name, i.name, t.name
FROM sys.indexes i
JOIN sys.tables t ON i.object_id = t.object_id
JOIN sys.schemas s ON t.schema_id = s.schema_id
WHERE i.is_primary_key = 0 AND i.name IS NOT NULL
ORDER BY object_type, schema_name, object_name
"#;

/// `@P1` is the bare schema name.
pub const SCHEMA_EXISTS: &str = "SELECT 1 AS present FROM sys.schemas WHERE name = @P1";

pub const SERVER_IDENTITY: &str =
    "SELECT @@SERVERNAME AS server_name, DB_NAME() AS current_database";
