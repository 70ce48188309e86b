//! Device identity, pose and alarm commands.

use armlink_frame::{Message, ProtocolId};
use bytes::Bytes;
use serde::Serialize;

use crate::device::error::Result;
use crate::device::payload::packed_payload;
use crate::device::Dobot;

/// Firmware and hardware version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeviceVersion {
    pub major: u8,
    pub minor: u8,
    pub revision: u8,
    pub hardware: u8,
}

packed_payload!(DeviceVersion {
    major: u8,
    minor: u8,
    revision: u8,
    hardware: u8,
});

impl std::fmt::Display for DeviceVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}.{}.{} (hw {})",
            self.major, self.minor, self.revision, self.hardware
        )
    }
}

/// Lifetime usage counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeviceCountInfo {
    /// Accumulated run time, as reported by the firmware.
    pub run_time: u64,
    pub power_on_count: u32,
    pub power_off_count: u32,
}

packed_payload!(DeviceCountInfo {
    run_time: u64,
    power_on_count: u32,
    power_off_count: u32,
});

/// Real-time end-effector pose (mm, degrees) and joint angles (degrees).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Pose {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub r: f32,
    pub joint_angle: [f32; 4],
}

packed_payload!(Pose {
    x: f32,
    y: f32,
    z: f32,
    r: f32,
    joint_angle: [f32; 4],
});

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Kinematics {
    pub velocity: f32,
    pub acceleration: f32,
}

packed_payload!(Kinematics {
    velocity: f32,
    acceleration: f32,
});

#[derive(Debug, Clone, Copy)]
struct ResetPose {
    manual: bool,
    rear_arm_angle: f32,
    front_arm_angle: f32,
}

packed_payload!(encode ResetPose {
    manual: bool,
    rear_arm_angle: f32,
    front_arm_angle: f32,
});

#[derive(Debug, Clone, Copy)]
struct WithL {
    enabled: bool,
    version: u8,
}

packed_payload!(encode WithL {
    enabled: bool,
    version: u8,
});

impl Dobot {
    pub async fn device_sn(&self) -> Result<String> {
        self.get_text(ProtocolId::DeviceSn).await
    }

    pub async fn set_device_sn(&self, sn: &str) -> Result<()> {
        self.set_text(ProtocolId::DeviceSn, "sn", sn).await
    }

    pub async fn device_name(&self) -> Result<String> {
        self.get_text(ProtocolId::DeviceName).await
    }

    pub async fn set_device_name(&self, name: &str) -> Result<()> {
        self.set_text(ProtocolId::DeviceName, "name", name).await
    }

    pub async fn device_version(&self) -> Result<DeviceVersion> {
        self.get(ProtocolId::DeviceVersion).await
    }

    /// Whether the sliding rail (L axis) is installed.
    pub async fn device_with_l(&self) -> Result<bool> {
        self.get_flag(ProtocolId::DeviceWithL).await
    }

    /// Declare the sliding rail. The device takes this through its queue.
    pub async fn set_device_with_l(&self, enabled: bool, version: u8) -> Result<u64> {
        self.enqueue(ProtocolId::DeviceWithL, &WithL { enabled, version })
            .await
    }

    /// Device clock in milliseconds since power-on.
    pub async fn device_time(&self) -> Result<u32> {
        self.get(ProtocolId::DeviceTime).await
    }

    pub async fn device_info(&self) -> Result<DeviceCountInfo> {
        self.get(ProtocolId::DeviceInfo).await
    }

    pub async fn pose(&self) -> Result<Pose> {
        self.get(ProtocolId::GetPose).await
    }

    /// Re-zero the pose from the arm angle sensors, or from the given angles
    /// when `manual` is set.
    pub async fn reset_pose(
        &self,
        manual: bool,
        rear_arm_angle: f32,
        front_arm_angle: f32,
    ) -> Result<()> {
        let params = ResetPose {
            manual,
            rear_arm_angle,
            front_arm_angle,
        };
        self.set(ProtocolId::ResetPose, &params).await
    }

    pub async fn kinematics(&self) -> Result<Kinematics> {
        self.get(ProtocolId::GetKinematics).await
    }

    /// Sliding rail position (mm).
    pub async fn pose_l(&self) -> Result<f32> {
        self.get(ProtocolId::GetPoseL).await
    }

    /// Read the alarm bitmap. The link refuses other commands while any bit
    /// is set.
    pub async fn alarms(&self) -> Result<Bytes> {
        let reply = self.request(Message::read(ProtocolId::AlarmsState)).await?;
        Ok(reply.params)
    }

    /// Clear every alarm.
    pub async fn clear_alarms(&self) -> Result<()> {
        self.request(Message::write(ProtocolId::AlarmsState, Bytes::new()))
            .await?;
        Ok(())
    }
}

/// Decode an alarm bitmap into the numbers of the raised alarms
/// (`group * 8 + bit`).
pub fn raised_alarms(bitmap: &[u8]) -> Vec<u16> {
    let mut raised = Vec::new();
    for (group, byte) in bitmap.iter().enumerate() {
        for bit in 0..8u16 {
            if byte & (1 << bit) != 0 {
                raised.push(group as u16 * 8 + bit);
            }
        }
    }
    raised
}
