//! Messages exchanged between the pool, its children and the outside world.

use crate::storage::{TickContext, TickReceipt, TickUpdate};
use crate::swap::{SwapProgress, SwapSession, TickCrossing};
use alloy_primitives::{Address, U256};
use clmm_types::{Cell, CellBuilder, CellSlice, CodecError, Record};

/// Message opcodes, as carried in forward payloads and logs
pub mod op {
    pub const MINT: u32 = 0xecad15c4;
    pub const SWAP: u32 = 0xca2663c4;
    pub const BURN: u32 = 0xbae7fba1;
    pub const COLLECT: u32 = 0xc89aeef9;
    pub const CROSS_SHARD_TICK_QUERY: u32 = 0x7977e2b1;
    pub const CROSS_SHARD_TICK_REPLY: u32 = 0xa06291ba;
    pub const MINT_COMPLETE: u32 = 0xfa2d911f;
    pub const MINT_REFUND: u32 = 0xdd487ecc;
    pub const ADD_LEG: u32 = 0x3a19ce4a;
    pub const REQUEST_REFUND: u32 = 0x7dd6e06a;
    pub const TICKS_UPDATED: u32 = 0x40ff7c51;
    pub const UPDATE_TICKS: u32 = 0x41761d0f;
    pub const TRANSFER: u32 = 0x3ee943f1;
    pub const TRANSFER_NOTIFICATION: u32 = 0x4fb8dedc;
}

/// Intent forwarded with a token transfer
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ForwardPayload {
    /// One leg of a two-leg deposit
    Mint {
        query_id: u64,
        tick_lower: i32,
        tick_upper: i32,
        liquidity: u128,
    },
    /// `amount_out == 0` swaps the whole transfer as exact input, otherwise the
    /// transfer is the maximum input for exactly `amount_out`
    Swap {
        query_id: u64,
        fee: u32,
        tick_spacing: i32,
        sqrt_price_limit_x96: U256,
        zero_for_one: bool,
        amount_out: u128,
    },
}

impl ForwardPayload {
    pub fn query_id(&self) -> u64 {
        match self {
            ForwardPayload::Mint { query_id, .. } | ForwardPayload::Swap { query_id, .. } => *query_id,
        }
    }
}

impl Record for ForwardPayload {
    fn store(&self, builder: &mut CellBuilder) -> Result<(), CodecError> {
        match self {
            ForwardPayload::Mint {
                query_id,
                tick_lower,
                tick_upper,
                liquidity,
            } => {
                builder
                    .store_u64(op::MINT as u64, 32)?
                    .store_u64(*query_id, 64)?
                    .store_int(*tick_lower as i128, 24)?
                    .store_int(*tick_upper as i128, 24)?
                    .store_u128(*liquidity, 128)?;
            }
            ForwardPayload::Swap {
                query_id,
                fee,
                tick_spacing,
                sqrt_price_limit_x96,
                zero_for_one,
                amount_out,
            } => {
                builder
                    .store_u64(op::SWAP as u64, 32)?
                    .store_u64(*query_id, 64)?
                    .store_u64(*fee as u64, 24)?
                    .store_int(*tick_spacing as i128, 24)?
                    .store_uint(*sqrt_price_limit_x96, 160)?
                    .store_bit(*zero_for_one)?
                    .store_coins(*amount_out)?;
            }
        }
        Ok(())
    }

    fn load(slice: &mut CellSlice<'_>) -> Result<Self, CodecError> {
        let opcode = slice.load_u64(32)? as u32;
        match opcode {
            op::MINT => Ok(ForwardPayload::Mint {
                query_id: slice.load_u64(64)?,
                tick_lower: slice.load_int(24)? as i32,
                tick_upper: slice.load_int(24)? as i32,
                liquidity: slice.load_u128(128)?,
            }),
            op::SWAP => Ok(ForwardPayload::Swap {
                query_id: slice.load_u64(64)?,
                fee: slice.load_u64(24)? as u32,
                tick_spacing: slice.load_int(24)? as i32,
                sqrt_price_limit_x96: slice.load_uint(160)?,
                zero_for_one: slice.load_bit()?,
                amount_out: slice.load_coins()?,
            }),
            other => Err(CodecError::UnknownOpcode(other)),
        }
    }
}

/// One token deposit held by the pool on behalf of a mint intent
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Leg {
    /// Pool-assigned identifier, unique per pool
    pub leg_id: u64,
    pub query_id: u64,
    pub owner: Address,
    /// Token wallet the deposit arrived through
    pub token: Address,
    pub amount: u128,
}

/// Why the pool sends tokens out
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransferReason {
    /// Funds returned after a failure, with its reason code
    Refund { code: u32 },
    /// Deposit or input left over after the operation took what it needed
    Excess,
    SwapOutput,
    Collect,
}

/// Message bodies
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Message {
    // === outside world -> pool ===
    TransferNotification {
        query_id: u64,
        amount: u128,
        from_user: Address,
        forward_payload: Cell,
    },
    Burn {
        query_id: u64,
        tick_lower: i32,
        tick_upper: i32,
        liquidity: u128,
    },
    Collect {
        query_id: u64,
        tick_lower: i32,
        tick_upper: i32,
        amount0_requested: u128,
        amount1_requested: u128,
    },

    // === pool <-> staging ===
    AddLeg {
        leg: Leg,
        tick_lower: i32,
        tick_upper: i32,
        liquidity: u128,
    },
    MintComplete {
        leg0: Leg,
        leg1: Leg,
        tick_lower: i32,
        tick_upper: i32,
        liquidity: u128,
    },
    MintRefund {
        leg: Leg,
        tick_lower: i32,
        tick_upper: i32,
        /// Reason code of the refund
        code: u32,
    },
    /// Ask a staging record to refund the leg the sender observed
    RequestRefund { observed_leg_id: u64 },

    // === pool <-> shard ===
    UpdateTicks {
        seq: u64,
        context: TickContext,
        updates: Vec<TickUpdate>,
    },
    TicksUpdated {
        seq: u64,
        /// Receipts in update order, or the failure's reason code
        result: Result<Vec<TickReceipt>, u32>,
    },
    RestoreTicks { seq: u64, receipts: Vec<TickReceipt> },
    CrossShardTickQuery { seq: u64, session: SwapSession },
    CrossShardTickReply {
        seq: u64,
        session: SwapSession,
        result: Result<SwapProgress, u32>,
    },
    UncrossTicks { seq: u64, crossings: Vec<TickCrossing> },

    // === pool -> outside world ===
    TokenTransfer {
        query_id: u64,
        /// Token wallet of the pool that performs the transfer
        token: Address,
        amount: u128,
        destination: Address,
        reason: TransferReason,
    },
    MintReceipt {
        query_id: u64,
        tick_lower: i32,
        tick_upper: i32,
        liquidity: u128,
        amount0: u128,
        amount1: u128,
    },
    BurnReceipt {
        query_id: u64,
        tick_lower: i32,
        tick_upper: i32,
        liquidity: u128,
        amount0: u128,
        amount1: u128,
    },
    SwapReceipt {
        query_id: u64,
        amount0: i128,
        amount1: i128,
    },

    /// A bounceable message that found no recipient, returned to its sender
    Bounced { original: Box<Message> },
}

impl Message {
    /// Short name for logs
    pub fn name(&self) -> &'static str {
        match self {
            Message::TransferNotification { .. } => "transfer_notification",
            Message::Burn { .. } => "burn",
            Message::Collect { .. } => "collect",
            Message::AddLeg { .. } => "add_leg",
            Message::MintComplete { .. } => "mint_complete",
            Message::MintRefund { .. } => "mint_refund",
            Message::RequestRefund { .. } => "request_refund",
            Message::UpdateTicks { .. } => "update_ticks",
            Message::TicksUpdated { .. } => "ticks_updated",
            Message::RestoreTicks { .. } => "restore_ticks",
            Message::CrossShardTickQuery { .. } => "cross_shard_tick_query",
            Message::CrossShardTickReply { .. } => "cross_shard_tick_reply",
            Message::UncrossTicks { .. } => "uncross_ticks",
            Message::TokenTransfer { .. } => "token_transfer",
            Message::MintReceipt { .. } => "mint_receipt",
            Message::BurnReceipt { .. } => "burn_receipt",
            Message::SwapReceipt { .. } => "swap_receipt",
            Message::Bounced { .. } => "bounced",
        }
    }

    /// Wire opcode, for messages that have one
    pub fn opcode(&self) -> Option<u32> {
        let opcode = match self {
            Message::TransferNotification { .. } => op::TRANSFER_NOTIFICATION,
            Message::Burn { .. } => op::BURN,
            Message::Collect { .. } => op::COLLECT,
            Message::AddLeg { .. } => op::ADD_LEG,
            Message::MintComplete { .. } => op::MINT_COMPLETE,
            Message::MintRefund { .. } => op::MINT_REFUND,
            Message::RequestRefund { .. } => op::REQUEST_REFUND,
            Message::UpdateTicks { .. } => op::UPDATE_TICKS,
            Message::TicksUpdated { .. } => op::TICKS_UPDATED,
            Message::CrossShardTickQuery { .. } => op::CROSS_SHARD_TICK_QUERY,
            Message::CrossShardTickReply { .. } => op::CROSS_SHARD_TICK_REPLY,
            Message::TokenTransfer { .. } => op::TRANSFER,
            _ => return None,
        };
        Some(opcode)
    }

    /// Build a token transfer notification carrying a forward payload
    pub fn notification(
        query_id: u64,
        amount: u128,
        from_user: Address,
        payload: &ForwardPayload,
    ) -> Result<Self, CodecError> {
        Ok(Message::TransferNotification {
            query_id,
            amount,
            from_user,
            forward_payload: payload.to_cell()?,
        })
    }
}
