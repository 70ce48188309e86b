//! Protocol command ids.
//!
//! Ids are grouped by function with a base per group (device info at 0,
//! pose at 10, alarms at 20, ...). The table is sparse: unused slots such as
//! 5 or 15 are not valid ids.

use std::fmt;

macro_rules! protocol_ids {
    ($( $(#[$meta:meta])* $name:ident = $value:literal, )+) => {
        /// A command id from the device's closed protocol table.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[repr(u8)]
        pub enum ProtocolId {
            $( $(#[$meta])* $name = $value, )+
        }

        impl ProtocolId {
            /// Every id in the table, in wire-value order.
            pub const ALL: &'static [ProtocolId] = &[$(ProtocolId::$name,)+];

            /// Human-readable command name.
            pub fn name(self) -> &'static str {
                match self {
                    $(ProtocolId::$name => stringify!($name),)+
                }
            }
        }

        impl TryFrom<u8> for ProtocolId {
            type Error = u8;

            fn try_from(value: u8) -> Result<Self, Self::Error> {
                match value {
                    $($value => Ok(ProtocolId::$name),)+
                    other => Err(other),
                }
            }
        }
    };
}

protocol_ids! {
    // Device information
    DeviceSn = 0,
    DeviceName = 1,
    DeviceVersion = 2,
    DeviceWithL = 3,
    DeviceTime = 4,
    DeviceInfo = 6,

    // Pose
    GetPose = 10,
    ResetPose = 11,
    GetKinematics = 12,
    GetPoseL = 13,

    // Alarm
    /// Read returns the alarm bitmap; write clears every alarm.
    AlarmsState = 20,

    // HOME
    HomeParams = 30,
    HomeCmd = 31,
    AutoLeveling = 32,

    // Hand-hold teaching
    HhtTrigMode = 40,
    HhtTrigOutputEnabled = 41,
    HhtTrigOutput = 42,

    // Arm orientation
    ArmOrientation = 50,

    // End effector
    EndEffectorParams = 60,
    EndEffectorLaser = 61,
    EndEffectorSuctionCup = 62,
    EndEffectorGripper = 63,

    // JOG
    JogJointParams = 70,
    JogCoordinateParams = 71,
    JogCommonParams = 72,
    JogCmd = 73,
    JogLParams = 74,

    // PTP
    PtpJointParams = 80,
    PtpCoordinateParams = 81,
    PtpJumpParams = 82,
    PtpCommonParams = 83,
    PtpCmd = 84,
    PtpLParams = 85,
    PtpWithLCmd = 86,
    PtpJump2Params = 87,
    PtpPoCmd = 88,
    PtpPoWithLCmd = 89,

    // CP
    CpParams = 90,
    CpCmd = 91,
    CpLeCmd = 92,
    CpRHoldEnable = 93,
    CpCommonParams = 94,

    // ARC
    ArcParams = 100,
    ArcCmd = 101,
    CircleCmd = 102,
    ArcCommonParams = 103,

    // WAIT
    WaitCmd = 110,

    // TRIG
    TrigCmd = 120,

    // Extended IO
    IoMultiplexing = 130,
    IoDo = 131,
    IoPwm = 132,
    IoDi = 133,
    IoAdc = 134,
    EMotor = 135,
    EMotorS = 136,
    ColorSensor = 137,
    IrSwitch = 138,

    // Calibration
    AngleSensorStaticError = 140,
    AngleSensorCoef = 141,
    BaseDecoderStaticError = 142,
    LrHandCalibrateValue = 143,

    // WIFI
    WifiConfigMode = 150,
    WifiSsid = 151,
    WifiPassword = 152,
    WifiIpAddress = 153,
    WifiNetmask = 154,
    WifiGateway = 155,
    WifiDns = 156,
    WifiConnectStatus = 157,

    // Firmware
    FirmwareSwitch = 160,
    FirmwareMode = 161,

    // Lost step
    LostStepSet = 170,
    LostStepDetect = 171,

    // UART4 peripherals
    CheckUart4PeripheralsModel = 180,
    Uart4PeripheralsEnabled = 181,

    // Pulse mode
    PulseMode = 190,

    // Test
    UserParams = 220,
    PtpTime = 221,

    // Queued command control
    QueuedCmdStartExec = 240,
    QueuedCmdStopExec = 241,
    QueuedCmdForceStopExec = 242,
    QueuedCmdStartDownload = 243,
    QueuedCmdStopDownload = 244,
    QueuedCmdClear = 245,
    QueuedCmdCurrentIndex = 246,
    /// Free slots in the device's queued-command FIFO (u32 LE).
    QueuedCmdLeftSpace = 247,
    QueuedCmdMotionFinish = 248,
}

impl ProtocolId {
    /// Wire value of this id.
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl From<ProtocolId> for u8 {
    fn from(id: ProtocolId) -> Self {
        id as u8
    }
}

impl fmt::Display for ProtocolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name(), self.as_u8())
    }
}
