//! 对话消息：角色、内容块

pub mod conversation;

pub use conversation::{ContentBlock, Message, Role};
