//! Wire format types for the chat-completions protocol

pub mod openai;
