use tapbot_controller::DeviceController;
use tapbot_types::geometry::{ScaleFactor, ScreenSize};
use tracing::{error, info};

/// Resolves the session's scale factor. A configured resolution wins over
/// the device query; any failure degrades to identity scaling.
pub async fn compute_scale<C>(controller: &C, fixed_resolution: Option<ScreenSize>) -> ScaleFactor
where
    C: DeviceController + ?Sized,
{
    let native = match fixed_resolution {
        Some(size) => Ok(size),
        None => controller.screen_size().await,
    };
    match native.and_then(ScaleFactor::from_native) {
        Ok(scale) => {
            info!("Screen scale factor {}", scale);
            scale
        }
        Err(err) => {
            error!("Error retrieving screen resolution: {}", err);
            ScaleFactor::IDENTITY
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tapbot_controller::MockController;

    #[tokio::test]
    async fn scale_follows_device_resolution() {
        let controller = MockController::new(ScreenSize::new(1440, 2560));
        let scale = compute_scale(&controller, None).await;
        assert_eq!(scale, ScaleFactor { x: 1440.0 / 1080.0, y: 2560.0 / 1920.0 });
    }

    #[tokio::test]
    async fn query_failure_means_identity() {
        let controller = MockController::without_screen_size("wm: not found");
        assert_eq!(compute_scale(&controller, None).await, ScaleFactor::IDENTITY);

        let controller = MockController::new(ScreenSize::new(0, 1920));
        assert_eq!(compute_scale(&controller, None).await, ScaleFactor::IDENTITY);
    }

    #[tokio::test]
    async fn fixed_resolution_skips_the_query() {
        let controller = MockController::without_screen_size("offline");
        let scale = compute_scale(&controller, Some(ScreenSize::new(540, 960))).await;
        assert_eq!(scale, ScaleFactor { x: 0.5, y: 0.5 });
    }
}
