use anyhow::Result;
use image::DynamicImage;

/// Local human-presence check run before the prompt is chosen.
pub trait PersonDetector: Send + Sync {
    fn detect(&self, image: &DynamicImage) -> Result<bool>;
}

/// Reports a caller-supplied answer without looking at the pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedDetector(pub bool);

impl PersonDetector for FixedDetector {
    fn detect(&self, _image: &DynamicImage) -> Result<bool> {
        Ok(self.0)
    }
}

impl<F> PersonDetector for F
where
    F: Fn(&DynamicImage) -> Result<bool> + Send + Sync,
{
    fn detect(&self, image: &DynamicImage) -> Result<bool> {
        self(image)
    }
}

#[cfg(test)]
mod tests {
    use image::{DynamicImage, RgbImage};

    use super::{FixedDetector, PersonDetector};

    #[test]
    fn fixed_detector_returns_its_answer() -> anyhow::Result<()> {
        let image = DynamicImage::ImageRgb8(RgbImage::new(4, 4));
        assert!(FixedDetector(true).detect(&image)?);
        assert!(!FixedDetector(false).detect(&image)?);
        Ok(())
    }

    #[test]
    fn closures_act_as_detectors() -> anyhow::Result<()> {
        let wide_means_person =
            |image: &DynamicImage| -> anyhow::Result<bool> { Ok(image.width() > image.height()) };
        let detector: &dyn PersonDetector = &wide_means_person;
        assert!(detector.detect(&DynamicImage::ImageRgb8(RgbImage::new(8, 4)))?);
        assert!(!detector.detect(&DynamicImage::ImageRgb8(RgbImage::new(4, 8)))?);
        Ok(())
    }
}
