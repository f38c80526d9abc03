//! Interactive calibration of the banknote inventories
//!
//! The operator drives one arm above the first banknote on each table side
//! and confirms; the planner's end-effector pose seeds that side's
//! inventory. The remaining slots are synthesized at a fixed spacing, and
//! the arm is swept over each one so the operator can verify the assumed
//! straight-line layout matches the physical table before any session runs.

use crate::domain::inventory::BanknoteInventory;
use crate::domain::types::ArmSide;
use crate::infra::config::Config;
use crate::io::planner::MotionPlanner;
use crate::io::ServiceResult;
use std::time::Duration;
use tokio::io::{stdin, AsyncBufReadExt, BufReader};
use tracing::info;

/// Build both inventories: interactively when `inventory.calibrate` is set,
/// otherwise from the poses given in config (dev mode without hardware).
pub async fn setup_inventories(
    planner: &dyn MotionPlanner,
    config: &Config,
) -> anyhow::Result<(BanknoteInventory, BanknoteInventory)> {
    if !config.calibrate() {
        info!("calibration_skipped_using_config_poses");
        return Ok((
            inventory_from_config(ArmSide::Left, config),
            inventory_from_config(ArmSide::Right, config),
        ));
    }

    let left = calibrate_inventory(planner, ArmSide::Left, config).await?;
    let right = calibrate_inventory(planner, ArmSide::Right, config).await?;
    Ok((left, right))
}

/// Inventory for one side from the configured first-slot pose.
pub fn inventory_from_config(side: ArmSide, config: &Config) -> BanknoteInventory {
    let values = match side {
        ArmSide::Left => config.left_initial_pose(),
        ArmSide::Right => config.right_initial_pose(),
    };
    BanknoteInventory::new(
        Config::pose_from_array(values),
        side,
        config.extra_slots(),
        config.spacing_m(),
    )
}

/// Interactively calibrate one table side. The same-side arm serves it.
pub async fn calibrate_inventory(
    planner: &dyn MotionPlanner,
    side: ArmSide,
    config: &Config,
) -> anyhow::Result<BanknoteInventory> {
    info!(side = %side, "calibration_started");
    println!("Calibrating banknote poses on the {side} side of the table.");
    println!("1. Move the robot's {side} hand above the first banknote.");
    prompt_enter("Press ENTER to record the pose...").await?;

    let initial_pose = planner.end_effector_pose(side).await?;
    let inventory =
        BanknoteInventory::new(initial_pose, side, config.extra_slots(), config.spacing_m());

    confirm_layout(planner, &inventory).await?;
    planner.set_neutral(side).await?;

    info!(side = %side, slots = %inventory.len(), "calibration_complete");
    Ok(inventory)
}

/// Sweep the arm over each synthesized slot so the operator can see where
/// the remaining banknotes are expected to lie.
pub async fn confirm_layout(
    planner: &dyn MotionPlanner,
    inventory: &BanknoteInventory,
) -> ServiceResult<()> {
    let arm = inventory.side();
    for pose in inventory.synthesized_poses() {
        planner.move_to(pose, arm).await?;
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
    Ok(())
}

async fn prompt_enter(message: &str) -> std::io::Result<()> {
    println!("{message}");
    let mut line = String::new();
    BufReader::new(stdin()).read_line(&mut line).await.map(|_| ())
}
