//! Per-stage delay lines.
//!
//! Each stage owns one contiguous arena of `lanes × latency` slots; lane `i`
//! uses slots `i * latency .. (i + 1) * latency`. Slot 0 is the newest
//! entry and the last slot is the oldest. A shift returns the oldest slot,
//! moves everything one slot older and writes the incoming value at slot 0,
//! so a value entered at cycle `t` leaves at cycle `t + latency`.
//!
//! A zero-latency stage stores nothing and passes its input straight
//! through.

use super::error::ModelError;

/// Pipeline stages in data-flow order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Multiply,
    Add,
    Accumulate,
    Round,
    Saturate,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::Multiply,
        Stage::Add,
        Stage::Accumulate,
        Stage::Round,
        Stage::Saturate,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Stage::Multiply => "multiply",
            Stage::Add => "add",
            Stage::Accumulate => "accumulate",
            Stage::Round => "round",
            Stage::Saturate => "saturate",
        }
    }
}

/// One pipeline slot: a value and its validity bit.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Slot {
    pub value: f32,
    pub valid: bool,
}

impl Slot {
    pub const BUBBLE: Slot = Slot {
        value: 0.0,
        valid: false,
    };

    pub fn new(value: f32, valid: bool) -> Self {
        Self { value, valid }
    }
}

/// Delay line arena for one stage across every lane.
#[derive(Debug, Clone, Default)]
pub struct StageBuffer {
    slots: Vec<Slot>,
    latency: usize,
}

impl StageBuffer {
    /// Reserve `lanes × latency` slots, reporting failure instead of aborting.
    pub fn try_new(stage: Stage, lanes: usize, latency: usize) -> Result<Self, ModelError> {
        let alloc_err = || ModelError::Allocation {
            what: stage.name(),
            lanes,
            slots: latency,
        };
        let len = lanes.checked_mul(latency).ok_or_else(alloc_err)?;

        let mut slots = Vec::new();
        slots.try_reserve_exact(len).map_err(|_| alloc_err())?;
        slots.resize(len, Slot::BUBBLE);

        Ok(Self { slots, latency })
    }

    pub fn latency(&self) -> usize {
        self.latency
    }

    /// Slots of one lane, newest first.
    pub fn lane(&self, lane: usize) -> &[Slot] {
        let start = lane * self.latency;
        &self.slots[start..start + self.latency]
    }

    /// Push `incoming` into a lane and return the slot that falls out.
    pub fn shift(&mut self, lane: usize, incoming: Slot) -> Slot {
        if self.latency == 0 {
            return incoming;
        }
        let start = lane * self.latency;
        let line = &mut self.slots[start..start + self.latency];
        let outgoing = line[self.latency - 1];
        line.rotate_right(1);
        line[0] = incoming;
        outgoing
    }

    /// Invalidate and zero every slot.
    pub fn clear(&mut self) {
        self.slots.fill(Slot::BUBBLE);
    }

    /// Drop the storage.
    pub fn release(&mut self) {
        self.slots = Vec::new();
        self.latency = 0;
    }
}
