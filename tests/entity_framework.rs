use ent_database::ent_framework::{
    project, replace_edges, ColumnDefinition, Crud, EdgeDefinition, Entity, EntityBuilder,
    IdStrategy, RelationLoader, TableDefinition,
};
use ent_database::infrastructure::{
    with_transaction, Database, InstrumentedDatabase, RowKey, SqliteDatabase, StatementStats,
    Statement,
};
use ent_database::AppError;
use serde_json::json;
use std::sync::Arc;

struct Fixture {
    db: Database,
    stats: Arc<StatementStats>,
    tags: Crud,
    posts: Crud,
    post_entity: Entity<RelationLoader, ()>,
}

async fn fixture() -> Fixture {
    let sqlite = SqliteDatabase::new_in_memory().await.unwrap().into_database();
    let (db, stats) = InstrumentedDatabase::wrap(sqlite);

    let tag_entity = EntityBuilder::new(|| {
        Ok(TableDefinition::new("tag", ColumnDefinition::text("id"), IdStrategy::CallerSupplied)
            .column(ColumnDefinition::text("name").not_null().unique()))
    })
    .build(|_| Ok(()), |_| Ok(()))
    .unwrap();

    let tag_table = tag_entity.table().clone();
    let post_entity = EntityBuilder::new(|| {
        Ok(TableDefinition::new("post", ColumnDefinition::integer("id"), IdStrategy::StoreAssigned)
            .column(ColumnDefinition::text("title").not_null()))
    })
    .edges(move |table| Ok(vec![EdgeDefinition::new("tags", "post_tag", table, &tag_table)]))
    .build(|ctx| ctx.relation_loader("tags", &tag_entity), |_| Ok(()))
    .unwrap();

    tag_entity.ensure_tables(&db).await.unwrap();
    post_entity.ensure_tables(&db).await.unwrap();

    let tags = Crud::new(Arc::new(tag_entity.table().clone()));
    let posts = Crud::new(Arc::new(post_entity.table().clone()));
    for (id, name) in [("a", "A"), ("b", "B"), ("c", "C")] {
        tags.create(db.clone(), &json!({ "id": id, "name": name })).await.unwrap();
    }
    stats.reset();

    Fixture {
        db,
        stats,
        tags,
        posts,
        post_entity,
    }
}

impl Fixture {
    async fn post(&self, title: &str) -> RowKey {
        let row = self
            .posts
            .create(self.db.clone(), &json!({ "title": title }))
            .await
            .unwrap();
        RowKey::from_value(&row["id"]).unwrap()
    }

    fn edge(&self) -> Arc<EdgeDefinition> {
        self.post_entity.edges().get("tags").unwrap()
    }

    async fn tag_names(&self, post: &RowKey) -> Vec<String> {
        let relations = self
            .post_entity
            .queries
            .load_for(&self.db, vec![post.clone()])
            .await
            .unwrap();
        relations
            .get(post)
            .iter()
            .map(|row| row["name"].as_str().unwrap().to_string())
            .collect()
    }
}

fn keys(ids: &[&str]) -> Vec<RowKey> {
    ids.iter().map(|id| RowKey::from(*id)).collect()
}

#[tokio::test]
async fn test_batch_loader_issues_one_join_for_any_id_count() {
    let f = fixture().await;
    let edge = f.edge();

    let mut posts = Vec::new();
    for i in 0..1000 {
        let post = f.post(&format!("post {}", i)).await;
        if i % 2 == 0 {
            replace_edges(&f.db, &edge, &post, keys(&["a", "c"])).await.unwrap();
        }
        posts.push(post);
    }

    f.stats.reset();
    let single = f.post_entity.queries.load_for(&f.db, vec![posts[0].clone()]).await.unwrap();
    assert_eq!(f.stats.count("relation_join"), 1);
    assert_eq!(single.len(), 1);
    assert_eq!(single.get(&posts[0]).len(), 2);

    f.stats.reset();
    let all = f.post_entity.queries.load_for(&f.db, posts.clone()).await.unwrap();
    assert_eq!(f.stats.count("relation_join"), 1);
    assert_eq!(f.stats.total(), 1);
    assert_eq!(all.len(), 1000);
    for (i, post) in posts.iter().enumerate() {
        assert!(all.contains(post));
        assert_eq!(all.get(post).len(), if i % 2 == 0 { 2 } else { 0 });
    }
}

#[tokio::test]
async fn test_empty_id_set_issues_no_statement() {
    let f = fixture().await;
    let relations = f.post_entity.queries.load_for(&f.db, Vec::new()).await.unwrap();
    assert!(relations.is_empty());
    assert_eq!(f.stats.total(), 0);
}

#[tokio::test]
async fn test_duplicate_ids_are_loaded_once() {
    let f = fixture().await;
    let post = f.post("dupes").await;
    replace_edges(&f.db, &f.edge(), &post, keys(&["b"])).await.unwrap();

    let relations = f
        .post_entity
        .queries
        .load_for(&f.db, vec![post.clone(), post.clone(), post.clone()])
        .await
        .unwrap();
    assert_eq!(relations.len(), 1);
    assert_eq!(relations.get(&post).len(), 1);
}

#[tokio::test]
async fn test_replace_edges_replaces_whole_set() {
    let f = fixture().await;
    let post = f.post("replace").await;
    let edge = f.edge();

    replace_edges(&f.db, &edge, &post, keys(&["a", "b"])).await.unwrap();
    replace_edges(&f.db, &edge, &post, keys(&["b", "c", "b"])).await.unwrap();
    assert_eq!(f.tag_names(&post).await, vec!["B", "C"]);

    let rows = f
        .db
        .fetch_all(Statement::new("count_edges", "SELECT tag_id FROM post_tag ORDER BY tag_id"))
        .await
        .unwrap();
    let targets: Vec<_> = rows.iter().map(|r| r["tag_id"].clone()).collect();
    assert_eq!(targets, vec![json!("b"), json!("c")]);
}

#[tokio::test]
async fn test_replace_with_empty_set_skips_insert() {
    let f = fixture().await;
    let post = f.post("clear").await;
    let edge = f.edge();
    replace_edges(&f.db, &edge, &post, keys(&["a"])).await.unwrap();

    f.stats.reset();
    replace_edges(&f.db, &edge, &post, Vec::new()).await.unwrap();
    assert_eq!(f.stats.count("delete_edges"), 1);
    assert_eq!(f.stats.count("insert_edges"), 0);
    assert!(f.tag_names(&post).await.is_empty());
}

#[tokio::test]
async fn test_edges_follow_insertion_order() {
    let f = fixture().await;
    let post = f.post("order").await;
    replace_edges(&f.db, &f.edge(), &post, keys(&["c", "a", "b"])).await.unwrap();
    assert_eq!(f.tag_names(&post).await, vec!["C", "A", "B"]);
}

#[tokio::test]
async fn test_failed_transaction_leaves_edges_untouched() {
    let f = fixture().await;
    let post = f.post("rollback").await;
    let edge = f.edge();
    replace_edges(&f.db, &edge, &post, keys(&["a", "b"])).await.unwrap();

    let (edge_in_tx, post_in_tx) = (Arc::clone(&edge), post.clone());
    let result: Result<(), AppError> = with_transaction(&f.db, |tx| async move {
        replace_edges(&tx, &edge_in_tx, &post_in_tx, keys(&["c"])).await?;
        Err(AppError::Internal("crash between steps".to_string()))
    })
    .await;

    assert!(result.is_err());
    assert_eq!(f.tag_names(&post).await, vec!["A", "B"]);
}

#[tokio::test]
async fn test_nested_transaction_rolls_back_inner_only() {
    let f = fixture().await;
    let post = f.post("nested").await;
    let edge = f.edge();

    let (edge_in_tx, post_in_tx) = (Arc::clone(&edge), post.clone());
    with_transaction(&f.db, |outer| async move {
        replace_edges(&outer, &edge_in_tx, &post_in_tx, keys(&["a"])).await?;
        let inner: Result<(), AppError> = with_transaction(&outer, |inner| async move {
            replace_edges(&inner, &edge_in_tx, &post_in_tx, keys(&["b", "c"])).await?;
            Err(AppError::Internal("inner failure".to_string()))
        })
        .await;
        assert!(inner.is_err());
        Ok(())
    })
    .await
    .unwrap();

    assert_eq!(f.tag_names(&post).await, vec!["A"]);
}

#[tokio::test]
async fn test_project_keeps_base_row_order() {
    let f = fixture().await;
    let first = f.post("first").await;
    let second = f.post("second").await;
    replace_edges(&f.db, &f.edge(), &second, keys(&["a"])).await.unwrap();

    let rows = f.posts.find_all(f.db.clone()).await.unwrap();
    let reversed: Vec<_> = rows.into_iter().rev().collect();
    let relations = f
        .post_entity
        .queries
        .load_for(&f.db, vec![first.clone(), second.clone()])
        .await
        .unwrap();
    let hydrated = project(reversed, &[("tags", &relations)], "id");

    assert_eq!(hydrated[0]["title"], json!("second"));
    assert_eq!(hydrated[0]["tags"].as_array().unwrap().len(), 1);
    assert_eq!(hydrated[1]["title"], json!("first"));
    assert_eq!(hydrated[1]["tags"], json!([]));
}

#[tokio::test]
async fn test_upsert_reuses_existing_natural_key() {
    let f = fixture().await;
    let existing = f
        .tags
        .upsert_by(f.db.clone(), "name", &json!({ "id": "z", "name": "A" }))
        .await
        .unwrap();
    assert_eq!(existing["id"], json!("a"));

    let fresh = f
        .tags
        .upsert_by(f.db.clone(), "name", &json!({ "id": "d", "name": "D" }))
        .await
        .unwrap();
    assert_eq!(fresh["id"], json!("d"));
    assert_eq!(f.tags.find_all(f.db.clone()).await.unwrap().len(), 4);
}

#[tokio::test]
async fn test_upsert_surfaces_collisions_on_other_unique_columns() {
    let f = fixture().await;
    let err = f
        .tags
        .upsert_by(f.db.clone(), "name", &json!({ "id": "a", "name": "NEW" }))
        .await
        .unwrap_err();
    assert!(err.is_unique_violation(), "unexpected error: {}", err);
    assert_eq!(f.tags.find_all(f.db.clone()).await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_deleting_target_cascades_to_edges() {
    let f = fixture().await;
    let post = f.post("cascade").await;
    replace_edges(&f.db, &f.edge(), &post, keys(&["a", "b"])).await.unwrap();

    f.tags.delete(f.db.clone(), RowKey::from("a")).await.unwrap();
    assert_eq!(f.tag_names(&post).await, vec!["B"]);
}

#[tokio::test]
async fn test_batch_loader_handles_more_ids_than_bind_slots() {
    let f = fixture().await;
    let tagged = f.post("tagged").await;
    replace_edges(&f.db, &f.edge(), &tagged, keys(&["b"])).await.unwrap();

    let mut owners: Vec<RowKey> = (1_000_000_i64..1_040_000).map(RowKey::Integer).collect();
    owners.push(tagged.clone());

    f.stats.reset();
    let relations = f.post_entity.queries.load_for(&f.db, owners).await.unwrap();
    assert_eq!(f.stats.total(), 1);
    assert_eq!(relations.len(), 40_001);
    assert_eq!(relations.get(&tagged).len(), 1);
    assert!(relations.get(&RowKey::Integer(1_000_000)).is_empty());
}

#[tokio::test]
async fn test_replace_edges_writes_large_target_sets_in_one_insert() {
    let f = fixture().await;
    f.db.execute(Statement::new(
        "seed_tags",
        "WITH RECURSIVE n(i) AS (SELECT 1 UNION ALL SELECT i + 1 FROM n WHERE i < 20000) \
         INSERT INTO tag (id, name) SELECT 't' || i, 'T' || i FROM n",
    ))
    .await
    .unwrap();
    let post = f.post("many").await;
    let targets: Vec<RowKey> = (1..=20_000).map(|i| RowKey::from(format!("t{}", i))).collect();

    f.stats.reset();
    replace_edges(&f.db, &f.edge(), &post, targets).await.unwrap();
    assert_eq!(f.stats.count("insert_edges"), 1);

    let names = f.tag_names(&post).await;
    assert_eq!(names.len(), 20_000);
    assert_eq!(&names[..3], &["T1", "T2", "T3"]);
    assert_eq!(names.last().map(String::as_str), Some("T20000"));
}
