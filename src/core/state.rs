//! 编排器状态机
//!
//! AwaitingUserInput → StreamingModelResponse → (ExecutingTools → StreamingModelResponse)* → AwaitingUserInput

use std::fmt;

use serde::Serialize;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub enum TurnState {
    #[default]
    AwaitingUserInput,
    StreamingModelResponse,
    ExecutingTools,
}

impl fmt::Display for TurnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TurnState::AwaitingUserInput => "AwaitingUserInput",
            TurnState::StreamingModelResponse => "StreamingModelResponse",
            TurnState::ExecutingTools => "ExecutingTools",
        };
        f.write_str(s)
    }
}
