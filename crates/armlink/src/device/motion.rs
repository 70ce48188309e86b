//! Motion commands: HOME, arm orientation, JOG, PTP, CP, ARC, WAIT and TRIG.
//!
//! Lengths are in millimetres, angles in degrees, velocities and
//! accelerations per second (squared), ratios in percent.

use armlink_frame::ProtocolId;
use bytes::{BufMut, BytesMut};
use serde::Serialize;

use crate::device::error::{DeviceError, Result};
use crate::device::payload::{packed_payload, wire_enum, Payload};
use crate::device::Dobot;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct HomeParams {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub r: f32,
}

packed_payload!(HomeParams {
    x: f32,
    y: f32,
    z: f32,
    r: f32,
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HomeCmd {
    pub reserved: u32,
}

packed_payload!(encode HomeCmd { reserved: u32 });

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AutoLevelingCmd {
    pub control_flag: u8,
    pub precision: f32,
}

packed_payload!(encode AutoLevelingCmd {
    control_flag: u8,
    precision: f32,
});

wire_enum! {
    pub enum ArmOrientation {
        Lefty = 0,
        Righty = 1,
    }
}

/// Per-joint JOG velocities and accelerations.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct JogJointParams {
    pub velocity: [f32; 4],
    pub acceleration: [f32; 4],
}

packed_payload!(JogJointParams {
    velocity: [f32; 4],
    acceleration: [f32; 4],
});

/// Per-axis (X, Y, Z, R) JOG velocities and accelerations.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct JogCoordinateParams {
    pub velocity: [f32; 4],
    pub acceleration: [f32; 4],
}

packed_payload!(JogCoordinateParams {
    velocity: [f32; 4],
    acceleration: [f32; 4],
});

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct JogLParams {
    pub velocity: f32,
    pub acceleration: f32,
}

packed_payload!(JogLParams {
    velocity: f32,
    acceleration: f32,
});

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct JogCommonParams {
    pub velocity_ratio: f32,
    pub acceleration_ratio: f32,
}

packed_payload!(JogCommonParams {
    velocity_ratio: f32,
    acceleration_ratio: f32,
});

wire_enum! {
    /// Which JOG key is held. `A`..`E` are joints or axes X, Y, Z, R, L
    /// depending on [`JogCmd::is_joint`].
    pub enum JogCommand {
        Idle = 0,
        APressed = 1,
        ANPressed = 2,
        BPressed = 3,
        BNPressed = 4,
        CPressed = 5,
        CNPressed = 6,
        DPressed = 7,
        DNPressed = 8,
        EPressed = 9,
        ENPressed = 10,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JogCmd {
    pub is_joint: bool,
    pub cmd: JogCommand,
}

packed_payload!(encode JogCmd {
    is_joint: bool,
    cmd: JogCommand,
});

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct PtpJointParams {
    pub velocity: [f32; 4],
    pub acceleration: [f32; 4],
}

packed_payload!(PtpJointParams {
    velocity: [f32; 4],
    acceleration: [f32; 4],
});

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct PtpCoordinateParams {
    pub xyz_velocity: f32,
    pub r_velocity: f32,
    pub xyz_acceleration: f32,
    pub r_acceleration: f32,
}

packed_payload!(PtpCoordinateParams {
    xyz_velocity: f32,
    r_velocity: f32,
    xyz_acceleration: f32,
    r_acceleration: f32,
});

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct PtpLParams {
    pub velocity: f32,
    pub acceleration: f32,
}

packed_payload!(PtpLParams {
    velocity: f32,
    acceleration: f32,
});

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct PtpJumpParams {
    pub jump_height: f32,
    pub z_limit: f32,
}

packed_payload!(PtpJumpParams {
    jump_height: f32,
    z_limit: f32,
});

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct PtpJump2Params {
    pub start_jump_height: f32,
    pub end_jump_height: f32,
    pub z_limit: f32,
}

packed_payload!(PtpJump2Params {
    start_jump_height: f32,
    end_jump_height: f32,
    z_limit: f32,
});

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct PtpCommonParams {
    pub velocity_ratio: f32,
    pub acceleration_ratio: f32,
}

packed_payload!(PtpCommonParams {
    velocity_ratio: f32,
    acceleration_ratio: f32,
});

wire_enum! {
    /// Point-to-point path shape and target interpretation.
    pub enum PtpMode {
        /// Lift, traverse, lower; Cartesian target.
        JumpXyz = 0,
        /// Joint-interpolated move; Cartesian target.
        MovjXyz = 1,
        /// Straight-line move; Cartesian target.
        MovlXyz = 2,
        JumpAngle = 3,
        MovjAngle = 4,
        MovlAngle = 5,
        /// Joint-interpolated move by joint increments.
        MovjAngleInc = 6,
        /// Straight-line move by Cartesian increments.
        MovlXyzInc = 7,
        MovjXyzInc = 8,
        JumpMovlXyz = 9,
    }
}

impl PtpMode {
    /// Whether the target is relative to the current pose.
    pub fn is_incremental(self) -> bool {
        matches!(
            self,
            PtpMode::MovjAngleInc | PtpMode::MovlXyzInc | PtpMode::MovjXyzInc
        )
    }

    /// Whether the target is given in joint angles rather than X, Y, Z, R.
    pub fn is_joint(self) -> bool {
        matches!(
            self,
            PtpMode::JumpAngle | PtpMode::MovjAngle | PtpMode::MovlAngle | PtpMode::MovjAngleInc
        )
    }
}

/// A point-to-point move. In joint modes `x..r` are joint 1..4 angles.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PtpCmd {
    pub mode: PtpMode,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub r: f32,
}

packed_payload!(encode PtpCmd {
    mode: PtpMode,
    x: f32,
    y: f32,
    z: f32,
    r: f32,
});

/// A point-to-point move including the sliding rail position `l`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PtpWithLCmd {
    pub mode: PtpMode,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub r: f32,
    pub l: f32,
}

packed_payload!(encode PtpWithLCmd {
    mode: PtpMode,
    x: f32,
    y: f32,
    z: f32,
    r: f32,
    l: f32,
});

/// An I/O level change fired part-way through a PTP move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParallelOutputCmd {
    /// Point along the move, in percent of its distance.
    pub ratio: u8,
    pub address: u16,
    pub level: u8,
}

packed_payload!(encode ParallelOutputCmd {
    ratio: u8,
    address: u16,
    level: u8,
});

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct CpParams {
    pub plan_acc: f32,
    pub junction_vel: f32,
    /// Acceleration, or the planning period when `real_time_track` is set.
    pub acc_or_period: f32,
    pub real_time_track: bool,
}

packed_payload!(CpParams {
    plan_acc: f32,
    junction_vel: f32,
    acc_or_period: f32,
    real_time_track: bool,
});

wire_enum! {
    pub enum CpMode {
        Relative = 0,
        Absolute = 1,
    }
}

/// A continuous-path segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CpCmd {
    pub mode: CpMode,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub velocity: f32,
}

packed_payload!(encode CpCmd {
    mode: CpMode,
    x: f32,
    y: f32,
    z: f32,
    velocity: f32,
});

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct CpCommonParams {
    pub velocity_ratio: f32,
    pub acceleration_ratio: f32,
}

packed_payload!(CpCommonParams {
    velocity_ratio: f32,
    acceleration_ratio: f32,
});

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct ArcParams {
    pub xyz_velocity: f32,
    pub r_velocity: f32,
    pub xyz_acceleration: f32,
    pub r_acceleration: f32,
}

packed_payload!(ArcParams {
    xyz_velocity: f32,
    r_velocity: f32,
    xyz_acceleration: f32,
    r_acceleration: f32,
});

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct ArcCommonParams {
    pub velocity_ratio: f32,
    pub acceleration_ratio: f32,
}

packed_payload!(ArcCommonParams {
    velocity_ratio: f32,
    acceleration_ratio: f32,
});

/// A Cartesian point with end-effector rotation.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub r: f32,
}

packed_payload!(Point {
    x: f32,
    y: f32,
    z: f32,
    r: f32,
});

/// An arc from the current pose through `via` to `to`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArcCmd {
    pub via: Point,
    pub to: Point,
}

packed_payload!(encode ArcCmd { via: Point, to: Point });

/// `count` full circles through `via` and `to`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CircleCmd {
    pub via: Point,
    pub to: Point,
    pub count: u32,
}

packed_payload!(encode CircleCmd {
    via: Point,
    to: Point,
    count: u32,
});

/// Pause the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitCmd {
    pub timeout_ms: u32,
}

packed_payload!(encode WaitCmd { timeout_ms: u32 });

/// Block the queue until an input or ADC condition holds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrigCmd {
    pub address: u8,
    /// 0: digital input level, 1: ADC value.
    pub mode: u8,
    /// Input: 0 equal, 1 not equal. ADC: 0 `<`, 1 `<=`, 2 `>=`, 3 `>`.
    pub condition: u8,
    pub threshold: f32,
}

packed_payload!(encode TrigCmd {
    address: u8,
    mode: u8,
    condition: u8,
    threshold: f32,
});

fn encode_parallel_move<T: Payload>(cmd: &T, outputs: &[ParallelOutputCmd]) -> Result<BytesMut> {
    let count = u8::try_from(outputs.len()).map_err(|_| {
        DeviceError::InvalidParams(format!("{} parallel outputs", outputs.len()))
    })?;
    let mut buf =
        BytesMut::with_capacity(T::SIZE + 1 + outputs.len() * ParallelOutputCmd::SIZE);
    cmd.encode(&mut buf);
    buf.put_u8(count);
    for output in outputs {
        output.encode(&mut buf);
    }
    Ok(buf)
}

impl Dobot {
    pub async fn home_params(&self) -> Result<HomeParams> {
        self.get(ProtocolId::HomeParams).await
    }

    pub async fn set_home_params(&self, params: &HomeParams, queued: bool) -> Result<Option<u64>> {
        self.set_queued(ProtocolId::HomeParams, params, queued).await
    }

    /// Run the homing routine.
    pub async fn home(&self, cmd: &HomeCmd, queued: bool) -> Result<Option<u64>> {
        self.set_queued(ProtocolId::HomeCmd, cmd, queued).await
    }

    pub async fn auto_leveling(&self, cmd: &AutoLevelingCmd, queued: bool) -> Result<Option<u64>> {
        self.set_queued(ProtocolId::AutoLeveling, cmd, queued).await
    }

    /// Precision reached by the last auto-leveling run.
    pub async fn auto_leveling_result(&self) -> Result<f32> {
        self.get(ProtocolId::AutoLeveling).await
    }

    pub async fn arm_orientation(&self) -> Result<ArmOrientation> {
        self.get_enum(ProtocolId::ArmOrientation).await
    }

    pub async fn set_arm_orientation(
        &self,
        orientation: ArmOrientation,
        queued: bool,
    ) -> Result<Option<u64>> {
        self.set_queued(ProtocolId::ArmOrientation, &orientation, queued)
            .await
    }

    pub async fn jog_joint_params(&self) -> Result<JogJointParams> {
        self.get(ProtocolId::JogJointParams).await
    }

    pub async fn set_jog_joint_params(
        &self,
        params: &JogJointParams,
        queued: bool,
    ) -> Result<Option<u64>> {
        self.set_queued(ProtocolId::JogJointParams, params, queued)
            .await
    }

    pub async fn jog_coordinate_params(&self) -> Result<JogCoordinateParams> {
        self.get(ProtocolId::JogCoordinateParams).await
    }

    pub async fn set_jog_coordinate_params(
        &self,
        params: &JogCoordinateParams,
        queued: bool,
    ) -> Result<Option<u64>> {
        self.set_queued(ProtocolId::JogCoordinateParams, params, queued)
            .await
    }

    pub async fn jog_l_params(&self) -> Result<JogLParams> {
        self.get(ProtocolId::JogLParams).await
    }

    /// The firmware only accepts this immediately.
    pub async fn set_jog_l_params(&self, params: &JogLParams) -> Result<()> {
        self.set(ProtocolId::JogLParams, params).await
    }

    pub async fn jog_common_params(&self) -> Result<JogCommonParams> {
        self.get(ProtocolId::JogCommonParams).await
    }

    pub async fn set_jog_common_params(
        &self,
        params: &JogCommonParams,
        queued: bool,
    ) -> Result<Option<u64>> {
        self.set_queued(ProtocolId::JogCommonParams, params, queued)
            .await
    }

    pub async fn jog(&self, cmd: &JogCmd, queued: bool) -> Result<Option<u64>> {
        self.set_queued(ProtocolId::JogCmd, cmd, queued).await
    }

    pub async fn ptp_joint_params(&self) -> Result<PtpJointParams> {
        self.get(ProtocolId::PtpJointParams).await
    }

    pub async fn set_ptp_joint_params(
        &self,
        params: &PtpJointParams,
        queued: bool,
    ) -> Result<Option<u64>> {
        self.set_queued(ProtocolId::PtpJointParams, params, queued)
            .await
    }

    pub async fn ptp_coordinate_params(&self) -> Result<PtpCoordinateParams> {
        self.get(ProtocolId::PtpCoordinateParams).await
    }

    pub async fn set_ptp_coordinate_params(
        &self,
        params: &PtpCoordinateParams,
        queued: bool,
    ) -> Result<Option<u64>> {
        self.set_queued(ProtocolId::PtpCoordinateParams, params, queued)
            .await
    }

    pub async fn ptp_l_params(&self) -> Result<PtpLParams> {
        self.get(ProtocolId::PtpLParams).await
    }

    pub async fn set_ptp_l_params(&self, params: &PtpLParams, queued: bool) -> Result<Option<u64>> {
        self.set_queued(ProtocolId::PtpLParams, params, queued).await
    }

    pub async fn ptp_jump_params(&self) -> Result<PtpJumpParams> {
        self.get(ProtocolId::PtpJumpParams).await
    }

    pub async fn set_ptp_jump_params(
        &self,
        params: &PtpJumpParams,
        queued: bool,
    ) -> Result<Option<u64>> {
        self.set_queued(ProtocolId::PtpJumpParams, params, queued)
            .await
    }

    pub async fn ptp_jump2_params(&self) -> Result<PtpJump2Params> {
        self.get(ProtocolId::PtpJump2Params).await
    }

    pub async fn set_ptp_jump2_params(
        &self,
        params: &PtpJump2Params,
        queued: bool,
    ) -> Result<Option<u64>> {
        self.set_queued(ProtocolId::PtpJump2Params, params, queued)
            .await
    }

    pub async fn ptp_common_params(&self) -> Result<PtpCommonParams> {
        self.get(ProtocolId::PtpCommonParams).await
    }

    pub async fn set_ptp_common_params(
        &self,
        params: &PtpCommonParams,
        queued: bool,
    ) -> Result<Option<u64>> {
        self.set_queued(ProtocolId::PtpCommonParams, params, queued)
            .await
    }

    /// Move point to point.
    pub async fn ptp(&self, cmd: &PtpCmd, queued: bool) -> Result<Option<u64>> {
        self.set_queued(ProtocolId::PtpCmd, cmd, queued).await
    }

    pub async fn ptp_with_l(&self, cmd: &PtpWithLCmd, queued: bool) -> Result<Option<u64>> {
        self.set_queued(ProtocolId::PtpWithLCmd, cmd, queued).await
    }

    /// Move point to point, switching outputs along the way. Always queued.
    pub async fn ptp_po(&self, cmd: &PtpCmd, outputs: &[ParallelOutputCmd]) -> Result<u64> {
        let params = encode_parallel_move(cmd, outputs)?;
        self.enqueue_raw(ProtocolId::PtpPoCmd, params.freeze()).await
    }

    pub async fn ptp_po_with_l(
        &self,
        cmd: &PtpWithLCmd,
        outputs: &[ParallelOutputCmd],
    ) -> Result<u64> {
        let params = encode_parallel_move(cmd, outputs)?;
        self.enqueue_raw(ProtocolId::PtpPoWithLCmd, params.freeze())
            .await
    }

    pub async fn cp_params(&self) -> Result<CpParams> {
        self.get(ProtocolId::CpParams).await
    }

    pub async fn set_cp_params(&self, params: &CpParams, queued: bool) -> Result<Option<u64>> {
        self.set_queued(ProtocolId::CpParams, params, queued).await
    }

    pub async fn cp(&self, cmd: &CpCmd, queued: bool) -> Result<Option<u64>> {
        self.set_queued(ProtocolId::CpCmd, cmd, queued).await
    }

    /// Continuous path with laser engraving; `cmd.velocity` carries the laser
    /// power (0-100).
    pub async fn cp_le(&self, cmd: &CpCmd, queued: bool) -> Result<Option<u64>> {
        self.set_queued(ProtocolId::CpLeCmd, cmd, queued).await
    }

    pub async fn cp_r_hold_enabled(&self) -> Result<bool> {
        self.get_flag(ProtocolId::CpRHoldEnable).await
    }

    pub async fn set_cp_r_hold_enabled(&self, enabled: bool) -> Result<()> {
        self.set(ProtocolId::CpRHoldEnable, &enabled).await
    }

    pub async fn cp_common_params(&self) -> Result<CpCommonParams> {
        self.get(ProtocolId::CpCommonParams).await
    }

    pub async fn set_cp_common_params(
        &self,
        params: &CpCommonParams,
        queued: bool,
    ) -> Result<Option<u64>> {
        self.set_queued(ProtocolId::CpCommonParams, params, queued)
            .await
    }

    pub async fn arc_params(&self) -> Result<ArcParams> {
        self.get(ProtocolId::ArcParams).await
    }

    pub async fn set_arc_params(&self, params: &ArcParams) -> Result<u64> {
        self.enqueue(ProtocolId::ArcParams, params).await
    }

    pub async fn arc(&self, cmd: &ArcCmd) -> Result<u64> {
        self.enqueue(ProtocolId::ArcCmd, cmd).await
    }

    pub async fn circle(&self, cmd: &CircleCmd) -> Result<u64> {
        self.enqueue(ProtocolId::CircleCmd, cmd).await
    }

    pub async fn arc_common_params(&self) -> Result<ArcCommonParams> {
        self.get(ProtocolId::ArcCommonParams).await
    }

    pub async fn set_arc_common_params(&self, params: &ArcCommonParams) -> Result<u64> {
        self.enqueue(ProtocolId::ArcCommonParams, params).await
    }

    /// Pause the queue for `cmd.timeout_ms`. Always queued.
    pub async fn wait(&self, cmd: &WaitCmd) -> Result<u64> {
        self.enqueue(ProtocolId::WaitCmd, cmd).await
    }

    pub async fn trigger(&self, cmd: &TrigCmd, queued: bool) -> Result<Option<u64>> {
        self.set_queued(ProtocolId::TrigCmd, cmd, queued).await
    }
}
