mod arg_value;
mod conversation;
mod error;
mod instruction;
mod risk;
mod worker_result;

pub use arg_value::ArgValue;
pub use conversation::ConversationEntry;
pub use error::OpsAiError;
pub use instruction::Instruction;
pub use risk::RiskLevel;
pub use worker_result::{RawOutput, WorkerResult};
