//! Banknote slots on one side of the table
//!
//! Each side holds one calibrated pose plus N synthesized poses offset at a
//! fixed spacing along x. The layout is a placeholder geometry model - it
//! assumes the banknotes are laid out in a straight line, which the
//! calibration sweep confirms visually before a session starts.

use crate::domain::types::{ArmSide, Pose};

/// A single banknote slot on the table.
#[derive(Debug, Clone)]
pub struct Banknote {
    pub pose: Pose,
    pub available: bool,
}

/// Ordered banknote slots for one table side. Insertion order is pick order;
/// the slot count is fixed for the inventory's lifetime and only the
/// availability flags mutate.
#[derive(Debug, Clone)]
pub struct BanknoteInventory {
    side: ArmSide,
    slots: Vec<Banknote>,
}

impl BanknoteInventory {
    /// Build the inventory from the calibrated pose of the first banknote,
    /// synthesizing `extra_slots` more at `spacing_m` intervals along x.
    pub fn new(initial_pose: Pose, side: ArmSide, extra_slots: usize, spacing_m: f64) -> Self {
        let mut slots = Vec::with_capacity(1 + extra_slots);
        slots.push(Banknote { pose: initial_pose, available: true });

        for _ in 0..extra_slots {
            let prev = &slots[slots.len() - 1];
            let pose = prev.pose.translated(spacing_m, 0.0, 0.0);
            slots.push(Banknote { pose, available: true });
        }

        Self { side, slots }
    }

    pub fn side(&self) -> ArmSide {
        self.side
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn available_count(&self) -> usize {
        self.slots.iter().filter(|b| b.available).count()
    }

    /// Poses of the synthesized slots (everything after the calibrated one),
    /// in pick order. The calibration sweep drives the arm over these.
    pub fn synthesized_poses(&self) -> impl Iterator<Item = &Pose> {
        self.slots.iter().skip(1).map(|b| &b.pose)
    }

    /// Marks every slot available again. Called once per new customer
    /// session, assuming the operator restocked the table.
    pub fn reset_availability(&mut self) {
        for banknote in &mut self.slots {
            banknote.available = true;
        }
    }

    /// First available slot in insertion order, marked unavailable on the
    /// way out. Linear scan: slot counts are single-digit.
    pub fn take_next(&mut self) -> Option<Pose> {
        for banknote in &mut self.slots {
            if banknote.available {
                banknote.available = false;
                return Some(banknote.pose);
            }
        }
        None
    }
}
