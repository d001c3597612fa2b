use tracing::{debug, warn};

use super::acquire;
use super::definition::{plan_definition, plan_index};
use super::table::plan_table;
use crate::db::{ConnectionProvider, SqlSession, require_environment};
use crate::error::EngineError;
use crate::introspect;
use crate::model::{ObjectPlan, ObjectRef, ObjectType};

async fn plan_object<S, T>(source: &mut S, target: &mut T, object: &ObjectRef) -> ObjectPlan
where
    S: SqlSession + ?Sized,
    T: SqlSession + ?Sized,
{
    let outcome = match object.object_type {
        ObjectType::Table => {
            match (
                introspect::snapshot(source, &object.schema, &object.name).await,
                introspect::snapshot(target, &object.schema, &object.name).await,
            ) {
                (Ok(src), Ok(tgt)) => Ok(plan_table(object.clone(), Some(&src), &tgt)),
                (Err(err), _) | (_, Err(err)) => Err(err),
            }
        }
        ObjectType::Index => match object.table.as_deref() {
            Some(table) => match (
                introspect::table_extras(source, &object.schema, table).await,
                introspect::table_extras(target, &object.schema, table).await,
            ) {
                (Ok(src), Ok(tgt)) => Ok(plan_index(object.clone(), Some(&src), Some(&tgt))),
                (Err(err), _) | (_, Err(err)) => Err(err),
            },
            None => Ok(plan_index(object.clone(), None, None)),
        },
        _ => match (
            introspect::definition(source, &object.schema, &object.name).await,
            introspect::definition(target, &object.schema, &object.name).await,
        ) {
            (Ok(src), Ok(tgt)) => Ok(plan_definition(object.clone(), src.as_deref(), tgt.as_deref())),
            (Err(err), _) | (_, Err(err)) => Err(err),
        },
    };
    outcome.unwrap_or_else(|err| {
        warn!(object = %object, error = %err, "object planning failed");
        ObjectPlan::failed(object.clone(), err.to_string())
    })
}

/// Plans each object from `source_env` onto `target_env`. A failing object is
/// recorded on its own plan and the remaining objects are still planned.
pub async fn plan_environment_diff<P: ConnectionProvider + ?Sized>(
    provider: &P,
    source_env: &str,
    target_env: &str,
    objects: &[ObjectRef],
) -> Result<Vec<ObjectPlan>, EngineError> {
    require_environment(provider, source_env)?;
    require_environment(provider, target_env)?;

    let mut source = acquire(provider, source_env).await?;
    let mut target = match acquire(provider, target_env).await {
        Ok(session) => session,
        Err(err) => {
            provider.release(source).await;
            return Err(err);
        }
    };

    let mut plans = Vec::with_capacity(objects.len());
    for object in objects {
        plans.push(plan_object(&mut source, &mut target, object).await);
    }

    provider.release(source).await;
    provider.release(target).await;
    debug!(source_env, target_env, objects = plans.len(), "environment diff planned");
    Ok(plans)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::fake::{FakeProvider, FakeSession};
    use crate::db::{ResultSet, Value};
    use crate::model::{NO_CHANGES, NO_DEFINITION_CHANGES};

    fn columns(rows: &[(&str, &str, i64)]) -> ResultSet {
        ResultSet::new(
            &["column_name", "type_name", "max_length", "is_nullable"],
            rows.iter()
                .map(|(name, ty, len)| {
                    vec![
                        Value::Text(name.to_string()),
                        Value::Text(ty.to_string()),
                        Value::Int(*len),
                        Value::Bool(true),
                    ]
                })
                .collect(),
        )
    }

    fn definition(text: &str) -> ResultSet {
        ResultSet::new(&["definition"], vec![vec![Value::Text(text.to_string())]])
    }

    #[tokio::test]
    async fn plans_tables_and_definitions_across_environments() {
        let provider = FakeProvider::default()
            .with(
                "DEV",
                FakeSession::new()
                    .respond("sys.computed_columns", vec![columns(&[("Id", "int", 4), ("Note", "varchar", 20)])])
                    .respond("OBJECT_DEFINITION(OBJECT_ID", vec![definition("CREATE VIEW v AS SELECT 1 AS x")]),
            )
            .with(
                "PROD",
                FakeSession::new()
                    .respond("sys.computed_columns", vec![columns(&[("Id", "int", 4)])])
                    .respond("OBJECT_DEFINITION(OBJECT_ID", vec![definition("CREATE VIEW v AS SELECT 1 AS x")]),
            );
        let objects = vec![
            ObjectRef::table("dbo", "Orders"),
            ObjectRef::new(ObjectType::View, "dbo", "v"),
        ];
        let plans = plan_environment_diff(&provider, "DEV", "PROD", &objects)
            .await
            .expect("plans");
        assert_eq!(plans.len(), 2);
        assert_eq!(plans[0].implementation, "ALTER TABLE [dbo].[Orders] ADD [Note] varchar(20) NULL");
        assert_ne!(plans[0].implementation, NO_CHANGES);
        assert_eq!(plans[1].implementation, NO_DEFINITION_CHANGES);
        assert_eq!(provider.release_count(), 2);
    }

    #[tokio::test]
    async fn failing_object_does_not_stop_siblings() {
        let provider = FakeProvider::default()
            .with(
                "DEV",
                FakeSession::new()
                    .fail_query("sys.computed_columns")
                    .respond("OBJECT_DEFINITION(OBJECT_ID", vec![definition("SELECT 1")]),
            )
            .with("PROD", FakeSession::new());
        let objects = vec![
            ObjectRef::table("dbo", "Broken"),
            ObjectRef::new(ObjectType::Procedure, "dbo", "p"),
        ];
        let plans = plan_environment_diff(&provider, "DEV", "PROD", &objects)
            .await
            .expect("plans");
        assert!(plans[0].error.is_some());
        assert_eq!(plans[1].implementation, "SELECT 1");
        assert_eq!(plans[1].rollback, "DROP PROCEDURE [dbo].[p]");
    }

    #[tokio::test]
    async fn unknown_target_fails_before_any_connection() {
        let provider = FakeProvider::default().with("DEV", FakeSession::new());
        let err = plan_environment_diff(&provider, "DEV", "QA", &[ObjectRef::table("dbo", "T")])
            .await
            .expect_err("unknown env");
        assert!(matches!(err, EngineError::Configuration(_)));
        assert_eq!(provider.release_count(), 0);
        assert!(provider.session("DEV").queries.is_empty());
    }
}
