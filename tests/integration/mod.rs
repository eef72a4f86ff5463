//! Integration tests for the relay
//!
//! Requests go through the real router; the upstream is either a wiremock
//! Azure OpenAI deployment or a scripted in-process provider.

mod chat_completions;
