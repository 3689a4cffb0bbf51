pub mod dingtalk;
pub mod email;
pub mod webhook;
