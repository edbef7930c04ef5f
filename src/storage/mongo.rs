//! MongoDB collection store.
//!
//! Upserts go through the server `update` command with `ordered: false`, so a
//! whole batch is one round trip and the server applies `$setOnInsert`,
//! `$set`, `$max` and `$addToSet` atomically per document. Any write error in
//! the reply fails the submission as a whole.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mongodb::bson::{self, Bson, doc};
use mongodb::options::{ClientOptions, Credential, FindOptions, IndexOptions, WriteConcern};
use mongodb::{Client, Collection as MongoCollection, Database, IndexModel};

use crate::error::{AppError, Result};
use crate::models::{
    BulkWriteSummary, Document, FieldValue, Fields, ID_FIELD, Listing, StorageConfig, UpsertOp,
    UpsertOutcome,
};
use crate::storage::{Collection, DocumentStore};

/// MongoDB implementation of [`DocumentStore`].
pub struct MongoStore {
    database: Database,
}

impl MongoStore {
    /// Connect using storage configuration and verify the server answers.
    pub async fn connect(config: &StorageConfig) -> Result<Self> {
        let uri = config
            .mongo_uri()
            .ok_or_else(|| AppError::config("storage.uri or storage.host is required"))?;

        let mut options = ClientOptions::parse(&uri).await?;
        if let (Some(user), Some(password)) = (&config.user, &config.password) {
            options.credential = Some(
                Credential::builder()
                    .username(user.clone())
                    .password(password.clone())
                    .build(),
            );
        }
        options.retry_writes = Some(true);
        options.write_concern = Some(WriteConcern::majority());

        let client = Client::with_options(options)?;
        let database = client.database(&config.database);

        match database.run_command(doc! { "ping": 1 }).await {
            Ok(_) => log::debug!("MongoDB connection successful."),
            Err(e) => {
                log::error!("MongoDB connection failed: {}", e);
                return Err(e.into());
            }
        }

        Ok(Self::new(database))
    }

    /// Wrap an existing database handle.
    pub fn new(database: Database) -> Self {
        Self { database }
    }

    fn collection(&self, collection: Collection) -> MongoCollection<bson::Document> {
        self.database.collection(collection.name())
    }

    /// Run one unordered `update` command for the given instructions.
    async fn run_update(
        &self,
        collection: Collection,
        ops: &[UpsertOp],
    ) -> Result<BulkWriteSummary> {
        let updates = ops
            .iter()
            .map(|op| {
                Ok(Bson::Document(doc! {
                    "q": { ID_FIELD: &op.id },
                    "u": update_document(op)?,
                    "upsert": true,
                }))
            })
            .collect::<Result<Vec<Bson>>>()?;

        let reply = self
            .database
            .run_command(doc! {
                "update": collection.name(),
                "updates": updates,
                "ordered": false,
            })
            .await?;

        if let Ok(errors) = reply.get_array("writeErrors") {
            if !errors.is_empty() {
                return Err(AppError::store(format!(
                    "{} of {} writes to {} failed, first: {}",
                    errors.len(),
                    ops.len(),
                    collection,
                    errors[0]
                )));
            }
        }
        if let Ok(concern) = reply.get_document("writeConcernError") {
            return Err(AppError::store(format!(
                "write concern error on {}: {}",
                collection, concern
            )));
        }

        let upserted = reply.get_array("upserted").map(|a| a.len() as u64).unwrap_or(0);
        let n = count(&reply, "n");
        Ok(BulkWriteSummary {
            matched: n.saturating_sub(upserted),
            modified: count(&reply, "nModified"),
            upserted,
        })
    }
}

/// Read a numeric reply field that may be encoded as int32 or int64.
fn count(reply: &bson::Document, key: &str) -> u64 {
    match reply.get(key) {
        Some(Bson::Int32(n)) => (*n).max(0) as u64,
        Some(Bson::Int64(n)) => (*n).max(0) as u64,
        _ => 0,
    }
}

fn to_bson(value: &FieldValue) -> Bson {
    match value {
        FieldValue::Null => Bson::Null,
        FieldValue::Bool(b) => Bson::Boolean(*b),
        FieldValue::Int(n) => Bson::Int64(*n),
        FieldValue::Float(f) => Bson::Double(*f),
        FieldValue::Time(t) => Bson::DateTime(bson::DateTime::from_millis(t.timestamp_millis())),
        FieldValue::Str(s) => Bson::String(s.clone()),
        FieldValue::Array(items) => Bson::Array(items.iter().map(to_bson).collect()),
    }
}

fn from_bson(value: &Bson) -> FieldValue {
    match value {
        Bson::Null => FieldValue::Null,
        Bson::Boolean(b) => FieldValue::Bool(*b),
        Bson::Int32(n) => FieldValue::Int(i64::from(*n)),
        Bson::Int64(n) => FieldValue::Int(*n),
        Bson::Double(f) => FieldValue::Float(*f),
        Bson::String(s) => FieldValue::Str(s.clone()),
        Bson::DateTime(d) => DateTime::<Utc>::from_timestamp_millis(d.timestamp_millis())
            .map_or(FieldValue::Null, FieldValue::Time),
        Bson::Array(items) => FieldValue::Array(items.iter().map(from_bson).collect()),
        other => FieldValue::Str(other.to_string()),
    }
}

fn fields_document(fields: &Fields) -> bson::Document {
    fields
        .iter()
        .map(|(k, v)| (k.to_string(), to_bson(v)))
        .collect()
}

/// Translate the four effect groups into update operators.
fn update_document(op: &UpsertOp) -> Result<bson::Document> {
    let mut update = bson::Document::new();
    for (operator, fields) in [
        ("$setOnInsert", &op.set_on_insert),
        ("$set", &op.set),
        ("$max", &op.max),
        ("$addToSet", &op.add_to_set),
    ] {
        if !fields.is_empty() {
            update.insert(operator, fields_document(fields));
        }
    }
    if update.is_empty() {
        return Err(AppError::store(format!("empty update for {}", op.id)));
    }
    Ok(update)
}

#[async_trait]
impl DocumentStore for MongoStore {
    async fn upsert(&self, collection: Collection, op: &UpsertOp) -> Result<UpsertOutcome> {
        let summary = self.run_update(collection, std::slice::from_ref(op)).await?;
        Ok(if summary.upserted > 0 {
            UpsertOutcome::Inserted
        } else if summary.modified > 0 {
            UpsertOutcome::MatchedAndModified
        } else {
            UpsertOutcome::Matched
        })
    }

    async fn bulk_upsert(
        &self,
        collection: Collection,
        ops: &[UpsertOp],
    ) -> Result<BulkWriteSummary> {
        if ops.is_empty() {
            return Ok(BulkWriteSummary::default());
        }
        self.run_update(collection, ops).await
    }

    async fn ensure_indexes(&self) -> Result<()> {
        let unique = || IndexOptions::builder().unique(true).build();

        let posts = self.collection(Collection::Posts);
        posts
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "post_id": 1 })
                    .options(unique())
                    .build(),
            )
            .await?;
        posts
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "subreddit": 1, "score_max": -1, "num_comments_max": -1 })
                    .build(),
            )
            .await?;
        posts
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "subreddit": 1, "seen_in": 1 })
                    .build(),
            )
            .await?;

        let comments = self.collection(Collection::Comments);
        comments
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "comment_id": 1 })
                    .options(unique())
                    .build(),
            )
            .await?;
        comments
            .create_index(IndexModel::builder().keys(doc! { "post_id": 1 }).build())
            .await?;
        comments
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "subreddit": 1, "created_utc": -1 })
                    .build(),
            )
            .await?;

        log::info!("MongoDB indexes ensured on posts and comments");
        Ok(())
    }

    async fn top_post_ids(
        &self,
        subreddit: &str,
        seen_in: Listing,
        limit: usize,
    ) -> Result<Vec<String>> {
        let filter = doc! { "subreddit": subreddit, "seen_in": seen_in.as_str() };
        let options = FindOptions::builder()
            .projection(doc! { "post_id": 1, "score_max": 1, "num_comments_max": 1 })
            .sort(doc! { "score_max": -1, "num_comments_max": -1 })
            .limit(limit as i64)
            .build();

        let mut cursor = self
            .collection(Collection::Posts)
            .find(filter)
            .with_options(options)
            .await?;

        let mut ids = Vec::new();
        while cursor.advance().await? {
            let doc = cursor.deserialize_current()?;
            if let Ok(id) = doc.get_str(ID_FIELD) {
                ids.push(id.to_string());
            }
        }
        Ok(ids)
    }

    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Document>> {
        let found = self
            .collection(collection)
            .find_one(doc! { ID_FIELD: id })
            .await?;
        Ok(found.map(|doc| {
            doc.iter()
                .map(|(k, v)| (k.clone(), from_bson(v)))
                .collect()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_update_document_operators() {
        let mut op = UpsertOp::new("abc123");
        op.set_on_insert.push(("created_utc", FieldValue::Int(1)));
        op.set.push(("score", FieldValue::Int(10)));
        op.max.push(("score_max", FieldValue::Int(10)));
        op.add_to_set.push(("seen_in", "hot".into()));

        let update = update_document(&op).unwrap();
        assert_eq!(
            update,
            doc! {
                "$setOnInsert": { "created_utc": 1_i64 },
                "$set": { "score": 10_i64 },
                "$max": { "score_max": 10_i64 },
                "$addToSet": { "seen_in": "hot" },
            }
        );
    }

    #[test]
    fn test_update_document_skips_empty_groups() {
        let mut op = UpsertOp::new("c1");
        op.set.push(("body", "hello".into()));
        let update = update_document(&op).unwrap();
        assert_eq!(update.keys().collect::<Vec<_>>(), ["$set"]);

        assert!(update_document(&UpsertOp::new("empty")).is_err());
    }

    #[test]
    fn test_time_maps_to_bson_datetime() {
        let t = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let bson = to_bson(&FieldValue::Time(t));
        assert!(matches!(bson, Bson::DateTime(_)));
        assert_eq!(from_bson(&bson), FieldValue::Time(t));
    }

    #[test]
    fn test_reply_counts() {
        let reply = doc! { "n": 5_i32, "nModified": 2_i32, "ok": 1.0 };
        assert_eq!(count(&reply, "n"), 5);
        assert_eq!(count(&reply, "nModified"), 2);
        assert_eq!(count(&reply, "missing"), 0);
    }
}
