//! Wire shape of escrow calls.
//!
//! Every mutating operation travels as an entry-function payload
//! `{function: "<module>::escrow::<op>", type_arguments: [], arguments: [...]}`
//! and every read as a view query of the same shape. [`Call`] and [`View`]
//! are the only encoders and decoders of those arguments; the client encodes
//! with them and every chain backend decodes with them.
//!
//! Arguments are JSON strings. Amounts are sent in wire units (`10^-8` of
//! a token) as decimal strings.

use std::fmt::Display;
use std::str::FromStr;

use gambit_core::settlement::{Award, Settlement};
use gambit_core::{
    Address, Amount, Command, EscrowConfig, EscrowLedger, EscrowParams, EscrowStatus,
    ExcessPolicy,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::CodecError;

/// Module name of the escrow inside its package.
pub const ESCROW_MODULE: &str = "escrow";

pub const INITIALIZE_ESCROW: &str = "initialize_escrow";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryFunctionPayload {
    pub function: String,
    pub type_arguments: Vec<String>,
    pub arguments: Vec<Value>,
}

/// A read-only call has the same shape as a transaction payload.
pub type ViewQuery = EntryFunctionPayload;

impl EntryFunctionPayload {
    pub fn new(module: &Address, op: &str, arguments: Vec<Value>) -> Self {
        Self {
            function: format!("{module}::{ESCROW_MODULE}::{op}"),
            type_arguments: Vec::new(),
            arguments,
        }
    }

    /// Package address and operation name of `function`.
    pub fn target(&self) -> Result<(Address, &str), CodecError> {
        let malformed = || CodecError::MalformedFunction(self.function.clone());
        let mut parts = self.function.split("::");
        let (Some(module), Some(ESCROW_MODULE), Some(op), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(malformed());
        };
        let module = module.parse().map_err(|_| malformed())?;
        Ok((module, op))
    }

    fn raw_arg(&self, op: &str, index: usize) -> Result<&str, CodecError> {
        let value = self
            .arguments
            .get(index)
            .ok_or_else(|| CodecError::MissingArgument {
                op: op.to_string(),
                index,
            })?;
        value.as_str().ok_or_else(|| CodecError::BadArgument {
            op: op.to_string(),
            index,
            reason: format!("expected a string, got {value}"),
        })
    }

    fn arg<T>(&self, op: &str, index: usize) -> Result<T, CodecError>
    where
        T: FromStr,
        T::Err: Display,
    {
        self.raw_arg(op, index)?
            .parse()
            .map_err(|e: T::Err| CodecError::BadArgument {
                op: op.to_string(),
                index,
                reason: e.to_string(),
            })
    }

    fn amount_arg(&self, op: &str, index: usize) -> Result<Amount, CodecError> {
        Amount::from_wire(self.raw_arg(op, index)?).map_err(|e| CodecError::BadArgument {
            op: op.to_string(),
            index,
            reason: e.to_string(),
        })
    }
}

/// A transaction before signing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxPayload {
    pub sender: Address,
    pub payload: EntryFunctionPayload,
}

impl TxPayload {
    pub fn new(sender: Address, payload: EntryFunctionPayload) -> Self {
        Self { sender, payload }
    }

    /// Hash identifying the `sequence`-th submission of this payload.
    pub fn hash(&self, sequence: u64) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.sender.as_bytes());
        hasher.update(self.payload.function.as_bytes());
        for arg in &self.payload.arguments {
            hasher.update(arg.to_string().as_bytes());
        }
        hasher.update(sequence.to_be_bytes());
        format!("0x{}", hex::encode(hasher.finalize()))
    }
}

/// Event emitted by the escrow module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChainEvent {
    EscrowCreated {
        escrow: Address,
    },
    StatusChanged {
        escrow: Address,
        from: EscrowStatus,
        to: EscrowStatus,
    },
    WinnerDeclared {
        escrow: Address,
        winner: Address,
    },
    TimedOut {
        escrow: Address,
    },
    /// The larger deposit's excess, handed back as both deposits locked.
    ExcessRefunded {
        escrow: Address,
        award: Award,
    },
    FundsReleased {
        escrow: Address,
        settlement: Settlement,
    },
}

/// A confirmed transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    pub hash: String,
    /// Unix time the transaction executed at.
    pub timestamp: u64,
    pub events: Vec<ChainEvent>,
}

impl TxReceipt {
    /// Address announced by an `EscrowCreated` event, if any.
    pub fn created_escrow(&self) -> Option<&Address> {
        self.events.iter().find_map(|event| match event {
            ChainEvent::EscrowCreated { escrow } => Some(escrow),
            _ => None,
        })
    }
}

/// A mutating escrow operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Initialize(EscrowParams),
    Apply { escrow: Address, command: Command },
}

impl Call {
    pub fn op(&self) -> &'static str {
        match self {
            Self::Initialize(_) => INITIALIZE_ESCROW,
            Self::Apply { command, .. } => command.name(),
        }
    }

    pub fn encode(&self, module: &Address) -> EntryFunctionPayload {
        let arguments = match self {
            Self::Initialize(params) => vec![
                params.game_id.to_string().into(),
                params.player1.to_string().into(),
                params.player2.to_string().into(),
                params.config.arbiter.to_string().into(),
                params.config.minimum_bet.to_wire().into(),
                params.config.timeout_secs.to_string().into(),
                policy_name(params.config.excess_policy).into(),
            ],
            Self::Apply { escrow, command } => {
                let mut args = vec![Value::from(escrow.to_string())];
                match command {
                    Command::Deposit { amount } => args.push(amount.to_wire().into()),
                    Command::CompleteGame {
                        winner: Some(winner),
                        ..
                    } => args.push(winner.to_string().into()),
                    Command::RaiseDispute { reason } => args.push(reason.clone().into()),
                    Command::ResolveDispute { resolution, notes } => {
                        args.push(resolution.as_str().into());
                        args.push(notes.clone().into());
                    }
                    _ => {}
                }
                args
            }
        };
        EntryFunctionPayload::new(module, self.op(), arguments)
    }

    /// Decode a payload into the package it targets and the call it carries.
    pub fn decode(payload: &EntryFunctionPayload) -> Result<(Address, Self), CodecError> {
        let (module, op) = payload.target()?;
        if op == INITIALIZE_ESCROW {
            let config = EscrowConfig {
                arbiter: payload.arg(op, 3)?,
                minimum_bet: payload.amount_arg(op, 4)?,
                timeout_secs: payload.arg(op, 5)?,
                excess_policy: parse_policy(payload.raw_arg(op, 6)?).ok_or_else(|| {
                    CodecError::BadArgument {
                        op: op.to_string(),
                        index: 6,
                        reason: "unknown excess policy".into(),
                    }
                })?,
            };
            let params = EscrowParams {
                game_id: payload.arg(op, 0)?,
                player1: payload.arg(op, 1)?,
                player2: payload.arg(op, 2)?,
                config,
            };
            return Ok((module, Self::Initialize(params)));
        }

        let escrow = payload.arg(op, 0)?;
        let command = match op {
            "deposit" => Command::Deposit {
                amount: payload.amount_arg(op, 1)?,
            },
            "sign_to_start_game" => Command::SignGameStart,
            "start_game" => Command::StartGame,
            "complete_game" => Command::CompleteGame {
                winner: Some(payload.arg(op, 1)?),
                is_draw: false,
            },
            "complete_game_as_draw" => Command::CompleteGame {
                winner: None,
                is_draw: true,
            },
            "release_funds" => Command::ReleaseFunds,
            "raise_dispute" => Command::RaiseDispute {
                reason: payload.arg(op, 1)?,
            },
            "resolve_dispute" => Command::ResolveDispute {
                resolution: payload.arg(op, 1)?,
                notes: payload.arg(op, 2)?,
            },
            "check_timeout" => Command::CheckTimeout,
            "cancel_escrow" => Command::Cancel,
            other => return Err(CodecError::UnknownFunction(other.to_string())),
        };
        Ok((module, Self::Apply { escrow, command }))
    }
}

fn policy_name(policy: ExcessPolicy) -> &'static str {
    match policy {
        ExcessPolicy::RefundAtLock => "refund_at_lock",
        ExcessPolicy::SweepToWinner => "sweep_to_winner",
        ExcessPolicy::Strand => "strand",
    }
}

fn parse_policy(s: &str) -> Option<ExcessPolicy> {
    match s {
        "refund_at_lock" => Some(ExcessPolicy::RefundAtLock),
        "sweep_to_winner" => Some(ExcessPolicy::SweepToWinner),
        "strand" => Some(ExcessPolicy::Strand),
        _ => None,
    }
}

/// A read of one escrow's on-chain state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum View {
    Status,
    Winner,
    Balance,
    MinimumBet,
    PlayerInfo(Address),
    TotalEscrowed,
    TimeRemaining,
    /// The whole ledger, used for reconciliation.
    Escrow,
}

impl View {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Status => "get_status",
            Self::Winner => "get_winner",
            Self::Balance => "get_balance",
            Self::MinimumBet => "get_minimum_bet",
            Self::PlayerInfo(_) => "get_player_info",
            Self::TotalEscrowed => "get_total_escrowed",
            Self::TimeRemaining => "get_time_remaining",
            Self::Escrow => "get_escrow",
        }
    }

    pub fn encode(&self, module: &Address, escrow: &Address) -> ViewQuery {
        let mut args = vec![Value::from(escrow.to_string())];
        if let Self::PlayerInfo(player) = self {
            args.push(player.to_string().into());
        }
        EntryFunctionPayload::new(module, self.name(), args)
    }

    /// Decode a query into its package, escrow and view.
    pub fn decode(query: &ViewQuery) -> Result<(Address, Address, Self), CodecError> {
        let (module, op) = query.target()?;
        let escrow = query.arg(op, 0)?;
        let view = match op {
            "get_status" => Self::Status,
            "get_winner" => Self::Winner,
            "get_balance" => Self::Balance,
            "get_minimum_bet" => Self::MinimumBet,
            "get_player_info" => Self::PlayerInfo(query.arg(op, 1)?),
            "get_total_escrowed" => Self::TotalEscrowed,
            "get_time_remaining" => Self::TimeRemaining,
            "get_escrow" => Self::Escrow,
            other => return Err(CodecError::UnknownFunction(other.to_string())),
        };
        Ok((module, escrow, view))
    }

    /// Value this view returns for `ledger` at unix time `now`.
    pub fn evaluate(&self, ledger: &EscrowLedger, now: u64) -> Result<Value, CodecError> {
        let value = match self {
            Self::Status => ledger.status().as_str().into(),
            Self::Winner => ledger
                .winner()
                .map(|w| Value::from(w.to_string()))
                .unwrap_or(Value::Null),
            Self::Balance => ledger.balance().to_wire().into(),
            Self::MinimumBet => ledger.minimum_bet().to_wire().into(),
            Self::PlayerInfo(player) => match ledger.player_info(player) {
                Some(slot) => to_json(slot)?,
                None => Value::Null,
            },
            Self::TotalEscrowed => ledger.total_escrowed().to_wire().into(),
            Self::TimeRemaining => ledger
                .time_remaining(now)
                .map(Value::from)
                .unwrap_or(Value::Null),
            Self::Escrow => to_json(ledger)?,
        };
        Ok(value)
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<Value, CodecError> {
    serde_json::to_value(value).map_err(|e| CodecError::BadView(e.to_string()))
}

/// Decode a structured view value.
pub fn from_view<T: DeserializeOwned>(value: Value) -> Result<T, CodecError> {
    serde_json::from_value(value).map_err(|e| CodecError::BadView(e.to_string()))
}

/// Decode an amount view value (a wire-unit decimal string).
pub fn amount_from_view(value: &Value) -> Result<Amount, CodecError> {
    value
        .as_str()
        .ok_or_else(|| CodecError::BadView(value.to_string()))
        .and_then(|s| Amount::from_wire(s).map_err(|e| CodecError::BadView(e.to_string())))
}
