use ent_database::core::UserId;
use ent_database::domains::messaging::{
    self, image, message, message_board, MessageBoard, NewImage, NewMessage, NewMessageBoard,
};
use ent_database::infrastructure::{Database, SqliteDatabase};
use ent_database::AppError;

async fn setup() -> Database {
    let db = SqliteDatabase::new_in_memory().await.unwrap().into_database();
    messaging::ensure_tables(&db).await.unwrap();
    db
}

async fn board(db: &Database, name: &str) -> MessageBoard {
    message_board()
        .unwrap()
        .actions
        .create
        .call(
            db,
            NewMessageBoard {
                name: name.to_string(),
                description: None,
            },
        )
        .await
        .unwrap()
}

fn post(board: &MessageBoard, content: &str) -> NewMessage {
    NewMessage {
        content: content.to_string(),
        message_board_id: board.id.clone(),
        image_id: None,
        created_by_user_id: UserId::new("user-1"),
    }
}

#[tokio::test]
async fn test_board_lifecycle() {
    let db = setup().await;
    let boards = message_board().unwrap();

    let general = board(&db, "General").await;
    board(&db, "Random").await;

    let all = boards.queries.query_all.call(&db, ()).await.unwrap();
    let names: Vec<_> = all.iter().map(|b| b.name.as_str()).collect();
    assert_eq!(names, vec!["General", "Random"]);

    let fetched = boards
        .queries
        .query_by_id
        .call(&db, general.id.clone())
        .await
        .unwrap();
    assert_eq!(fetched, Some(general.clone()));

    let err = boards
        .actions
        .create
        .call(
            &db,
            NewMessageBoard {
                name: String::new(),
                description: None,
            },
        )
        .await
        .unwrap_err();
    assert!(err.is_validation());
}

#[tokio::test]
async fn test_image_round_trip() {
    let db = setup().await;
    let images = image().unwrap();
    let bytes = vec![0x89, b'P', b'N', b'G', 0, 255, 13, 10];

    let created = images
        .actions
        .create
        .call(&db, NewImage::from_bytes(&bytes, "image/png"))
        .await
        .unwrap();
    assert!(created.id.value() > 0);
    assert_eq!(created.image_src, format!("/application/images/{}", created.id.value()));
    assert_eq!(created.bytes().unwrap(), bytes);

    let fetched = images
        .queries
        .query_by_id
        .call(&db, created.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(fetched, created);
}

#[tokio::test]
async fn test_image_ids_are_unique() {
    let db = setup().await;
    let images = image().unwrap();
    let mut ids = Vec::new();
    for _ in 0..20 {
        let created = images
            .actions
            .create
            .call(&db, NewImage::from_bytes(b"gif", "image/gif"))
            .await
            .unwrap();
        ids.push(created.id.value());
    }
    let mut sorted = ids.clone();
    sorted.sort_unstable();
    sorted.dedup();
    assert_eq!(sorted.len(), ids.len());
}

#[tokio::test]
async fn test_image_rejects_bad_input() {
    let db = setup().await;
    let images = image().unwrap();

    let err = images
        .actions
        .create
        .call(&db, NewImage::from_bytes(b"data", "not a mime type"))
        .await
        .unwrap_err();
    match err {
        AppError::Validation(issues) => assert!(issues.has_path("mime_type")),
        other => panic!("unexpected error {:?}", other),
    }

    let err = images
        .actions
        .create
        .call(
            &db,
            NewImage {
                file_content: "%%% not base64 %%%".to_string(),
                mime_type: "image/png".to_string(),
            },
        )
        .await
        .unwrap_err();
    match err {
        AppError::Validation(issues) => assert!(issues.has_path("file_content")),
        other => panic!("unexpected error {:?}", other),
    }
}

#[tokio::test]
async fn test_messages_by_board() {
    let db = setup().await;
    let messages = message().unwrap();
    let general = board(&db, "General").await;
    let random = board(&db, "Random").await;

    let picture = image()
        .unwrap()
        .actions
        .create
        .call(&db, NewImage::from_bytes(b"jpeg", "image/jpeg"))
        .await
        .unwrap();

    let mut with_image = post(&general, "hello");
    with_image.image_id = Some(picture.id);
    let first = messages.actions.create.call(&db, with_image).await.unwrap();
    messages.actions.create.call(&db, post(&general, "world")).await.unwrap();
    messages.actions.create.call(&db, post(&random, "elsewhere")).await.unwrap();

    assert_eq!(first.image_id, Some(picture.id));
    assert_eq!(first.created_by_user_id, UserId::new("user-1"));

    let on_general = messages
        .queries
        .query_by_board
        .call(&db, general.id.clone())
        .await
        .unwrap();
    let contents: Vec<_> = on_general.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["hello", "world"]);

    // Removing the image keeps the message.
    image().unwrap().actions.delete.call(&db, picture.id).await.unwrap();
    let reloaded = messages
        .queries
        .query_by_id
        .call(&db, first.id.clone())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reloaded.image_id, None);
}

#[tokio::test]
async fn test_message_validation() {
    let db = setup().await;
    let general = board(&db, "General").await;

    let err = message()
        .unwrap()
        .actions
        .create
        .call(&db, post(&general, &"x".repeat(4001)))
        .await
        .unwrap_err();
    match err {
        AppError::Validation(issues) => assert!(issues.has_path("content")),
        other => panic!("unexpected error {:?}", other),
    }

    let mut anonymous = post(&general, "who am i");
    anonymous.created_by_user_id = UserId::new("");
    let err = message()
        .unwrap()
        .actions
        .create
        .call(&db, anonymous)
        .await
        .unwrap_err();
    assert!(err.is_validation());
}

#[tokio::test]
async fn test_board_delete_cascades_to_messages() {
    let db = setup().await;
    let messages = message().unwrap();
    let general = board(&db, "General").await;
    let created = messages.actions.create.call(&db, post(&general, "bye")).await.unwrap();

    let deleted = message_board()
        .unwrap()
        .actions
        .delete
        .call(&db, general.id.clone())
        .await
        .unwrap();
    assert_eq!(deleted.map(|b| b.id), Some(general.id.clone()));

    let gone = messages.queries.query_by_id.call(&db, created.id.clone()).await.unwrap();
    assert!(gone.is_none());
    assert!(messages
        .queries
        .query_by_board
        .call(&db, general.id)
        .await
        .unwrap()
        .is_empty());
}
