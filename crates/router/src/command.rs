// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Parsing of client commands from array messages

use thiserror::Error;
use ust_core::timestamp::{self, TimestampError};
use ust_core::{Filter, FilterError, TransactionId};

/// Errors from parsing a command
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("empty command")]
    Empty,

    #[error("unknown command {0:?}")]
    Unknown(String),

    #[error("{command} expects {expected} arguments, got {got}")]
    Arity {
        command: &'static str,
        expected: &'static str,
        got: usize,
    },

    #[error("invalid timestamp {text:?}: {source}")]
    InvalidTimestamp {
        text: String,
        #[source]
        source: TimestampError,
    },

    #[error("invalid filter: {0}")]
    InvalidFilter(#[from] FilterError),

    #[error("{0} must not be empty")]
    EmptyArgument(&'static str),
}

/// Arguments of `openTransaction`
#[derive(Debug, Clone, PartialEq)]
pub struct OpenArgs {
    /// `None` for a new transaction
    pub id: Option<TransactionId>,
    pub group_name: String,
    /// Empty means "the node name given to `init`"
    pub node_name: String,
    pub category: String,
    pub timestamp: u64,
    pub key: String,
    pub crash_protect: bool,
    pub ack: bool,
    pub filter: Option<Filter>,
}

/// A command sent by a client after the handshake
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Init {
        node_name: String,
    },
    OpenTransaction(Box<OpenArgs>),
    /// Followed on the wire by a scalar payload
    Log {
        id: TransactionId,
        timestamp: u64,
    },
    CloseTransaction {
        id: TransactionId,
        timestamp: u64,
        ack: bool,
    },
    Flush,
    Status,
    Shutdown {
        graceful: bool,
    },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Init { .. } => "init",
            Command::OpenTransaction(_) => "openTransaction",
            Command::Log { .. } => "log",
            Command::CloseTransaction { .. } => "closeTransaction",
            Command::Flush => "flush",
            Command::Status => "status",
            Command::Shutdown { .. } => "shutdown",
        }
    }

    /// Parse an array message into a command
    pub fn parse(fields: &[String]) -> Result<Self, CommandError> {
        let (name, args) = fields.split_first().ok_or(CommandError::Empty)?;
        match name.as_str() {
            "init" => {
                arity("init", "1", args, 1..=1)?;
                Ok(Command::Init {
                    node_name: args[0].clone(),
                })
            }
            "openTransaction" => {
                arity("openTransaction", "7 to 9", args, 7..=9)?;
                parse_open(args).map(|open| Command::OpenTransaction(Box::new(open)))
            }
            "log" => {
                arity("log", "2", args, 2..=2)?;
                Ok(Command::Log {
                    id: parse_id(&args[0])?,
                    timestamp: parse_timestamp(&args[1])?,
                })
            }
            "closeTransaction" => {
                arity("closeTransaction", "2 or 3", args, 2..=3)?;
                Ok(Command::CloseTransaction {
                    id: parse_id(&args[0])?,
                    timestamp: parse_timestamp(&args[1])?,
                    ack: args.get(2).is_some_and(|a| is_true(a)),
                })
            }
            "flush" => {
                arity("flush", "0", args, 0..=0)?;
                Ok(Command::Flush)
            }
            "status" => {
                arity("status", "0", args, 0..=0)?;
                Ok(Command::Status)
            }
            "shutdown" => {
                arity("shutdown", "0 or 1", args, 0..=1)?;
                Ok(Command::Shutdown {
                    graceful: args.first().map_or(true, |a| is_true(a)),
                })
            }
            other => Err(CommandError::Unknown(other.to_string())),
        }
    }
}

fn arity(
    command: &'static str,
    expected: &'static str,
    args: &[String],
    range: std::ops::RangeInclusive<usize>,
) -> Result<(), CommandError> {
    if range.contains(&args.len()) {
        Ok(())
    } else {
        Err(CommandError::Arity {
            command,
            expected,
            got: args.len(),
        })
    }
}

fn parse_open(args: &[String]) -> Result<OpenArgs, CommandError> {
    let id = (!args[0].is_empty()).then(|| TransactionId::new(args[0].as_str()));
    if args[1].is_empty() {
        return Err(CommandError::EmptyArgument("group name"));
    }
    if args[3].is_empty() {
        return Err(CommandError::EmptyArgument("category"));
    }
    let filter = match args.get(8) {
        Some(expression) if !expression.is_empty() => Some(Filter::parse(expression)?),
        _ => None,
    };
    Ok(OpenArgs {
        id,
        group_name: args[1].clone(),
        node_name: args[2].clone(),
        category: args[3].clone(),
        timestamp: parse_timestamp(&args[4])?,
        key: args[5].clone(),
        crash_protect: is_true(&args[6]),
        ack: args.get(7).is_some_and(|a| is_true(a)),
        filter,
    })
}

fn parse_id(text: &str) -> Result<TransactionId, CommandError> {
    if text.is_empty() {
        return Err(CommandError::EmptyArgument("transaction id"));
    }
    Ok(TransactionId::new(text))
}

fn parse_timestamp(text: &str) -> Result<u64, CommandError> {
    timestamp::decode(text).map_err(|source| CommandError::InvalidTimestamp {
        text: text.to_string(),
        source,
    })
}

fn is_true(text: &str) -> bool {
    text == "true"
}

#[cfg(test)]
#[path = "command_tests.rs"]
mod tests;
