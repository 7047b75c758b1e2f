// Messaging domain - boards, messages and their images

pub mod image;
pub mod message;
pub mod message_board;

pub use image::{image, Image, ImageId, NewImage};
pub use message::{message, Message, MessageId, NewMessage};
pub use message_board::{message_board, MessageBoard, MessageBoardId, NewMessageBoard};

use crate::error::AppResult;
use crate::infrastructure::database::Database;

/// Create every messaging table, referenced tables first.
pub async fn ensure_tables(db: &Database) -> AppResult<()> {
    message_board()?.ensure_tables(db).await?;
    image()?.ensure_tables(db).await?;
    message()?.ensure_tables(db).await
}
