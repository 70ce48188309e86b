//! Hand-held teaching, end effector, extended I/O and sensor commands.

use armlink_frame::ProtocolId;
use serde::Serialize;

use crate::device::error::{DeviceError, Result};
use crate::device::payload::{packed_payload, wire_enum};
use crate::device::Dobot;

wire_enum! {
    /// When the hand-held teaching trigger records a point.
    pub enum HhtTrigMode {
        KeyReleased = 0,
        PeriodicInterval = 1,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct EndEffectorParams {
    pub x_bias: f32,
    pub y_bias: f32,
    pub z_bias: f32,
}

packed_payload!(EndEffectorParams {
    x_bias: f32,
    y_bias: f32,
    z_bias: f32,
});

/// State of a switched tool (laser, suction cup, gripper).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ToolState {
    /// Whether the tool output is under host control.
    pub enabled: bool,
    pub on: bool,
}

packed_payload!(ToolState {
    enabled: bool,
    on: bool,
});

wire_enum! {
    pub enum IoFunction {
        Dummy = 0,
        DigitalOut = 1,
        Pwm = 2,
        DigitalIn = 3,
        Adc = 4,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IoMultiplexing {
    pub address: u8,
    pub function: IoFunction,
}

packed_payload!(encode IoMultiplexing {
    address: u8,
    function: IoFunction,
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IoDo {
    pub address: u8,
    pub level: u8,
}

packed_payload!(IoDo {
    address: u8,
    level: u8,
});

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IoPwm {
    pub address: u8,
    /// Hz.
    pub frequency: f32,
    /// Percent.
    pub duty_cycle: f32,
}

packed_payload!(IoPwm {
    address: u8,
    frequency: f32,
    duty_cycle: f32,
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IoAdc {
    pub address: u8,
    pub value: u16,
}

packed_payload!(IoAdc {
    address: u8,
    value: u16,
});

/// Stepper on one of the extension motor ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EMotor {
    pub index: u8,
    pub enabled: bool,
    /// Pulses per second; the sign selects the direction.
    pub speed: i32,
}

packed_payload!(encode EMotor {
    index: u8,
    enabled: bool,
    speed: i32,
});

/// Stepper move over a fixed number of pulses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EMotorS {
    pub index: u8,
    pub enabled: bool,
    pub speed: i32,
    pub distance: u32,
}

packed_payload!(encode EMotorS {
    index: u8,
    enabled: bool,
    speed: i32,
    distance: u32,
});

wire_enum! {
    /// Extension port a color or infrared sensor is plugged into.
    pub enum SensorPort {
        Gp1 = 0,
        Gp2 = 1,
        Gp4 = 2,
        Gp5 = 3,
    }
}

/// Sensor switch; `version` selects the sensor hardware revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorConfig {
    pub enabled: bool,
    pub port: SensorPort,
    pub version: u8,
}

packed_payload!(encode SensorConfig {
    enabled: bool,
    port: SensorPort,
    version: u8,
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

packed_payload!(Color {
    r: u8,
    g: u8,
    b: u8,
});

impl Dobot {
    pub async fn hht_trig_mode(&self) -> Result<HhtTrigMode> {
        self.get_enum(ProtocolId::HhtTrigMode).await
    }

    pub async fn set_hht_trig_mode(&self, mode: HhtTrigMode) -> Result<()> {
        self.set(ProtocolId::HhtTrigMode, &mode).await
    }

    pub async fn hht_trig_output_enabled(&self) -> Result<bool> {
        self.get_flag(ProtocolId::HhtTrigOutputEnabled).await
    }

    pub async fn set_hht_trig_output_enabled(&self, enabled: bool) -> Result<()> {
        self.set(ProtocolId::HhtTrigOutputEnabled, &enabled).await
    }

    /// Whether the teaching trigger has fired.
    pub async fn hht_trig_output(&self) -> Result<bool> {
        self.get_flag(ProtocolId::HhtTrigOutput).await
    }

    pub async fn end_effector_params(&self) -> Result<EndEffectorParams> {
        self.get(ProtocolId::EndEffectorParams).await
    }

    pub async fn set_end_effector_params(
        &self,
        params: &EndEffectorParams,
        queued: bool,
    ) -> Result<Option<u64>> {
        self.set_queued(ProtocolId::EndEffectorParams, params, queued)
            .await
    }

    pub async fn laser(&self) -> Result<ToolState> {
        self.get(ProtocolId::EndEffectorLaser).await
    }

    pub async fn set_laser(&self, state: ToolState, queued: bool) -> Result<Option<u64>> {
        self.set_queued(ProtocolId::EndEffectorLaser, &state, queued)
            .await
    }

    pub async fn suction_cup(&self) -> Result<ToolState> {
        self.get(ProtocolId::EndEffectorSuctionCup).await
    }

    pub async fn set_suction_cup(&self, state: ToolState, queued: bool) -> Result<Option<u64>> {
        self.set_queued(ProtocolId::EndEffectorSuctionCup, &state, queued)
            .await
    }

    pub async fn gripper(&self) -> Result<ToolState> {
        self.get(ProtocolId::EndEffectorGripper).await
    }

    pub async fn set_gripper(&self, state: ToolState, queued: bool) -> Result<Option<u64>> {
        self.set_queued(ProtocolId::EndEffectorGripper, &state, queued)
            .await
    }

    /// Function assigned to an extension I/O pin.
    pub async fn io_multiplexing(&self, address: u8) -> Result<IoFunction> {
        let id = ProtocolId::IoMultiplexing;
        let (_, raw): (u8, u8) = self.get_with(id, &address).await?;
        IoFunction::try_from(raw).map_err(|value| DeviceError::UnexpectedValue { id, value })
    }

    pub async fn set_io_multiplexing(
        &self,
        params: &IoMultiplexing,
        queued: bool,
    ) -> Result<Option<u64>> {
        self.set_queued(ProtocolId::IoMultiplexing, params, queued)
            .await
    }

    pub async fn io_do(&self, address: u8) -> Result<IoDo> {
        self.get_with(ProtocolId::IoDo, &address).await
    }

    pub async fn set_io_do(&self, params: &IoDo, queued: bool) -> Result<Option<u64>> {
        self.set_queued(ProtocolId::IoDo, params, queued).await
    }

    pub async fn io_pwm(&self, address: u8) -> Result<IoPwm> {
        self.get_with(ProtocolId::IoPwm, &address).await
    }

    pub async fn set_io_pwm(&self, params: &IoPwm, queued: bool) -> Result<Option<u64>> {
        self.set_queued(ProtocolId::IoPwm, params, queued).await
    }

    /// Digital input level on `address`.
    pub async fn io_di(&self, address: u8) -> Result<u8> {
        let (_, level): (u8, u8) = self.get_with(ProtocolId::IoDi, &address).await?;
        Ok(level)
    }

    pub async fn io_adc(&self, address: u8) -> Result<IoAdc> {
        self.get_with(ProtocolId::IoAdc, &address).await
    }

    pub async fn set_emotor(&self, params: &EMotor, queued: bool) -> Result<Option<u64>> {
        self.set_queued(ProtocolId::EMotor, params, queued).await
    }

    pub async fn set_emotor_s(&self, params: &EMotorS, queued: bool) -> Result<Option<u64>> {
        self.set_queued(ProtocolId::EMotorS, params, queued).await
    }

    pub async fn set_color_sensor(&self, config: &SensorConfig) -> Result<()> {
        self.set(ProtocolId::ColorSensor, config).await
    }

    /// Latest reading of the color sensor.
    pub async fn color_sensor(&self) -> Result<Color> {
        self.get(ProtocolId::ColorSensor).await
    }

    pub async fn set_infrared_sensor(&self, config: &SensorConfig) -> Result<()> {
        self.set(ProtocolId::IrSwitch, config).await
    }

    /// Whether the infrared sensor on `port` detects an object.
    pub async fn infrared_sensor(&self, port: SensorPort) -> Result<u8> {
        self.get_with(ProtocolId::IrSwitch, &port).await
    }
}
