//! Sensor calibration, Wi-Fi module and lost-step detection commands.

use armlink_frame::{Message, ProtocolId};
use bytes::Bytes;
use serde::Serialize;

use crate::device::error::Result;
use crate::device::payload::packed_payload;
use crate::device::Dobot;

/// Per-arm values for the rear and front arm angle sensors, in degrees or as
/// a scale factor depending on the command.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct ArmAngles {
    pub rear_arm: f32,
    pub front_arm: f32,
}

packed_payload!(ArmAngles {
    rear_arm: f32,
    front_arm: f32,
});

impl Dobot {
    // Calibration.

    /// Static offset of the rear and front arm angle sensors.
    pub async fn angle_sensor_static_error(&self) -> Result<ArmAngles> {
        self.get(ProtocolId::AngleSensorStaticError).await
    }

    pub async fn set_angle_sensor_static_error(&self, error: &ArmAngles) -> Result<()> {
        self.set(ProtocolId::AngleSensorStaticError, error).await
    }

    /// Scale factors applied to the rear and front arm angle sensors.
    pub async fn angle_sensor_coef(&self) -> Result<ArmAngles> {
        self.get(ProtocolId::AngleSensorCoef).await
    }

    pub async fn set_angle_sensor_coef(&self, coef: &ArmAngles) -> Result<()> {
        self.set(ProtocolId::AngleSensorCoef, coef).await
    }

    pub async fn base_decoder_static_error(&self) -> Result<f32> {
        self.get(ProtocolId::BaseDecoderStaticError).await
    }

    pub async fn set_base_decoder_static_error(&self, error: f32) -> Result<()> {
        self.set(ProtocolId::BaseDecoderStaticError, &error).await
    }

    /// Left/right hand calibration value.
    pub async fn lr_hand_calibrate_value(&self) -> Result<f32> {
        self.get(ProtocolId::LrHandCalibrateValue).await
    }

    pub async fn set_lr_hand_calibrate_value(&self, value: f32) -> Result<()> {
        self.set(ProtocolId::LrHandCalibrateValue, &value).await
    }

    // Wi-Fi module.

    pub async fn wifi_config_mode(&self) -> Result<bool> {
        self.get_flag(ProtocolId::WifiConfigMode).await
    }

    pub async fn set_wifi_config_mode(&self, enabled: bool) -> Result<()> {
        self.set(ProtocolId::WifiConfigMode, &enabled).await
    }

    pub async fn wifi_ssid(&self) -> Result<String> {
        self.get_text(ProtocolId::WifiSsid).await
    }

    pub async fn set_wifi_ssid(&self, ssid: &str) -> Result<()> {
        self.set_text(ProtocolId::WifiSsid, "ssid", ssid).await
    }

    pub async fn wifi_password(&self) -> Result<String> {
        self.get_text(ProtocolId::WifiPassword).await
    }

    pub async fn set_wifi_password(&self, password: &str) -> Result<()> {
        self.set_text(ProtocolId::WifiPassword, "password", password)
            .await
    }

    // Lost-step detection.

    /// Threshold beyond which a joint counts as having lost steps.
    pub async fn set_lost_step_params(&self, threshold: f32, queued: bool) -> Result<Option<u64>> {
        self.set_queued(ProtocolId::LostStepSet, &threshold, queued)
            .await
    }

    /// Run a lost-step check.
    pub async fn lost_step_cmd(&self, queued: bool) -> Result<Option<u64>> {
        let msg = Message::write(ProtocolId::LostStepDetect, Bytes::new()).queued(queued);
        self.command(msg).await
    }
}


#[cfg(all(test, unix))]
mod device_tests {
    use super::*;
    use crate::device::error::DeviceError;
    use crate::device::testing::{answering, device, last};

    #[tokio::test]
    async fn angle_sensor_coef_read() {
        let (dobot, seen) = device(answering(vec![
            0x00, 0x00, 0x80, 0x3F, 0x00, 0x00, 0x00, 0x40,
        ]));
        let coef = dobot.angle_sensor_coef().await.unwrap();
        assert_eq!(coef.rear_arm, 1.0);
        assert_eq!(coef.front_arm, 2.0);

        let sent = last(&seen);
        assert_eq!(sent.id, ProtocolId::AngleSensorCoef);
        assert!(!sent.rw);
        dobot.close().await;
    }

    #[tokio::test]
    async fn base_decoder_error_is_one_float() {
        let (dobot, seen) = device(answering(Vec::new()));
        dobot.set_base_decoder_static_error(0.5).await.unwrap();

        let sent = last(&seen);
        assert_eq!(sent.id, ProtocolId::BaseDecoderStaticError);
        assert!(sent.rw);
        assert!(!sent.is_queued);
        assert_eq!(sent.params.as_ref(), &0.5f32.to_le_bytes());
        dobot.close().await;
    }

    #[tokio::test]
    async fn short_calibration_reply_is_invalid() {
        let (dobot, _) = device(answering(vec![0x00, 0x00]));
        let err = dobot.lr_hand_calibrate_value().await.unwrap_err();
        assert!(matches!(
            err,
            DeviceError::InvalidResponse {
                id: ProtocolId::LrHandCalibrateValue,
                expected: 4,
                actual: 2,
            }
        ));
        dobot.close().await;
    }

    #[tokio::test]
    async fn wifi_ssid_is_nul_terminated() {
        let (dobot, seen) = device(answering(Vec::new()));
        dobot.set_wifi_ssid("lab-net").await.unwrap();

        let sent = last(&seen);
        assert_eq!(sent.id, ProtocolId::WifiSsid);
        assert_eq!(sent.params.as_ref(), b"lab-net\0");
        dobot.close().await;
    }

    #[tokio::test]
    async fn empty_wifi_password_is_rejected_locally() {
        let (dobot, seen) = device(answering(Vec::new()));
        let err = dobot.set_wifi_password("").await.unwrap_err();
        assert!(matches!(err, DeviceError::InvalidParams(_)));
        assert!(seen.lock().unwrap().is_empty());
        dobot.close().await;
    }

    #[tokio::test]
    async fn wifi_config_mode_read() {
        let (dobot, _) = device(answering(vec![1]));
        assert!(dobot.wifi_config_mode().await.unwrap());
        dobot.close().await;
    }

    #[tokio::test]
    async fn lost_step_params_queued() {
        let (dobot, seen) = device(answering(Vec::new()));
        let index = dobot.set_lost_step_params(5.0, true).await.unwrap();
        assert_eq!(index, Some(42));

        let sent = last(&seen);
        assert_eq!(sent.id, ProtocolId::LostStepSet);
        assert!(sent.is_queued);
        assert_eq!(sent.params.as_ref(), &5.0f32.to_le_bytes());
        dobot.close().await;
    }

    #[tokio::test]
    async fn lost_step_cmd_has_no_params() {
        let (dobot, seen) = device(answering(Vec::new()));
        assert_eq!(dobot.lost_step_cmd(true).await.unwrap(), Some(42));

        let sent = last(&seen);
        assert_eq!(sent.id, ProtocolId::LostStepDetect);
        assert!(sent.rw);
        assert!(sent.params.is_empty());
        dobot.close().await;
    }
}
