//! Zero-mean normalized cross-correlation (the `TM_CCOEFF_NORMED` score).

use image::{imageops, imageops::FilterType, GrayImage};
use tapbot_types::Result;

use crate::vision_error;

/// Coarse templates are never shrunk below this many pixels per side.
const MIN_COARSE_SIDE: u32 = 12;
const FLAT_VARIANCE: f64 = 1e-6;
/// Below this fraction of the full template's contrast, the downsampled
/// template has lost its detail and the coarse pass cannot be trusted.
const MIN_COARSE_CONTRAST: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchOptions {
    /// Largest downsampling factor for the coarse search pass. 1 disables it
    /// and scores every position at full resolution; anything larger trades
    /// exactness for speed.
    pub max_coarse_factor: u32,
    /// Coarse peaks refined at full resolution.
    pub candidates: usize,
}

impl MatchOptions {
    pub fn exhaustive() -> Self {
        Self {
            max_coarse_factor: 1,
            candidates: 1,
        }
    }

    /// Coarse-to-fine search, downsampling by at most `max_factor`.
    pub fn coarse(max_factor: u32) -> Self {
        Self {
            max_coarse_factor: max_factor,
            candidates: 8,
        }
    }
}

/// Every position is scored at full resolution.
impl Default for MatchOptions {
    fn default() -> Self {
        Self::exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchLocation {
    pub x: u32,
    pub y: u32,
    pub score: f32,
}

/// Summed-area tables for window sums of pixel values and their squares.
struct Integral {
    stride: usize,
    sum: Vec<f64>,
    sq: Vec<f64>,
}

impl Integral {
    fn new(image: &GrayImage) -> Self {
        let (w, h) = (image.width() as usize, image.height() as usize);
        let stride = w + 1;
        let mut sum = vec![0.0; stride * (h + 1)];
        let mut sq = vec![0.0; stride * (h + 1)];
        let raw = image.as_raw();
        for y in 0..h {
            let mut row_sum = 0.0;
            let mut row_sq = 0.0;
            for x in 0..w {
                let v = f64::from(raw[y * w + x]);
                row_sum += v;
                row_sq += v * v;
                let idx = (y + 1) * stride + x + 1;
                sum[idx] = sum[idx - stride] + row_sum;
                sq[idx] = sq[idx - stride] + row_sq;
            }
        }
        Self { stride, sum, sq }
    }

    fn window(&self, x: usize, y: usize, w: usize, h: usize) -> (f64, f64) {
        let s = self.stride;
        let (a, b, c, d) = (y * s + x, y * s + x + w, (y + h) * s + x, (y + h) * s + x + w);
        (
            self.sum[d] - self.sum[b] - self.sum[c] + self.sum[a],
            self.sq[d] - self.sq[b] - self.sq[c] + self.sq[a],
        )
    }
}

struct PreparedTemplate {
    width: usize,
    height: usize,
    zero_mean: Vec<f64>,
    norm: f64,
}

impl PreparedTemplate {
    fn new(template: &GrayImage) -> Self {
        let raw = template.as_raw();
        let n = raw.len() as f64;
        let mean = raw.iter().map(|&v| f64::from(v)).sum::<f64>() / n;
        let zero_mean: Vec<f64> = raw.iter().map(|&v| f64::from(v) - mean).collect();
        let norm = zero_mean.iter().map(|v| v * v).sum::<f64>().sqrt();
        Self {
            width: template.width() as usize,
            height: template.height() as usize,
            zero_mean,
            norm,
        }
    }

    fn is_flat(&self) -> bool {
        self.norm * self.norm <= FLAT_VARIANCE
    }

    /// Standard deviation of the pixel values.
    fn contrast(&self) -> f64 {
        self.norm / (self.zero_mean.len() as f64).sqrt()
    }
}

struct Scorer<'a> {
    image: &'a GrayImage,
    integral: Integral,
    template: PreparedTemplate,
}

impl<'a> Scorer<'a> {
    fn new(image: &'a GrayImage, template: &GrayImage) -> Self {
        Self {
            image,
            integral: Integral::new(image),
            template: PreparedTemplate::new(template),
        }
    }

    fn max_x(&self) -> usize {
        self.image.width() as usize - self.template.width
    }

    fn max_y(&self) -> usize {
        self.image.height() as usize - self.template.height
    }

    /// Flat windows and flat templates have no defined correlation and
    /// score 0.
    fn score_at(&self, x: usize, y: usize) -> f64 {
        let t = &self.template;
        if t.is_flat() {
            return 0.0;
        }
        let n = (t.width * t.height) as f64;
        let (sum, sq) = self.integral.window(x, y, t.width, t.height);
        let variance = sq - sum * sum / n;
        if variance <= FLAT_VARIANCE {
            return 0.0;
        }

        let iw = self.image.width() as usize;
        let raw = self.image.as_raw();
        let mut cross = 0.0;
        for ty in 0..t.height {
            let row = &raw[(y + ty) * iw + x..(y + ty) * iw + x + t.width];
            let trow = &t.zero_mean[ty * t.width..(ty + 1) * t.width];
            cross += row
                .iter()
                .zip(trow)
                .map(|(&p, &q)| f64::from(p) * q)
                .sum::<f64>();
        }
        (cross / (t.norm * variance.sqrt())).clamp(-1.0, 1.0)
    }

    fn best_in(&self, xs: (usize, usize), ys: (usize, usize)) -> MatchLocation {
        let mut best = MatchLocation {
            x: xs.0 as u32,
            y: ys.0 as u32,
            score: f32::MIN,
        };
        for y in ys.0..=ys.1 {
            for x in xs.0..=xs.1 {
                let score = self.score_at(x, y) as f32;
                if score > best.score {
                    best = MatchLocation {
                        x: x as u32,
                        y: y as u32,
                        score,
                    };
                }
            }
        }
        best
    }

    fn all_scores(&self) -> Vec<MatchLocation> {
        let mut scores = Vec::with_capacity((self.max_x() + 1) * (self.max_y() + 1));
        for y in 0..=self.max_y() {
            for x in 0..=self.max_x() {
                scores.push(MatchLocation {
                    x: x as u32,
                    y: y as u32,
                    score: self.score_at(x, y) as f32,
                });
            }
        }
        scores
    }
}

/// Finds the position where `template` correlates best with `image`.
pub fn best_match(
    image: &GrayImage,
    template: &GrayImage,
    options: &MatchOptions,
) -> Result<MatchLocation> {
    if template.width() == 0 || template.height() == 0 {
        return Err(vision_error("template image is empty"));
    }
    if template.width() > image.width() || template.height() > image.height() {
        return Err(vision_error(format!(
            "template {}x{} is larger than capture {}x{}",
            template.width(),
            template.height(),
            image.width(),
            image.height()
        )));
    }

    let factor = coarse_factor(template, options);
    let full = Scorer::new(image, template);
    if factor <= 1 {
        return Ok(full.best_in((0, full.max_x()), (0, full.max_y())));
    }

    let shrink = |img: &GrayImage| {
        imageops::resize(
            img,
            (img.width() / factor).max(1),
            (img.height() / factor).max(1),
            FilterType::Triangle,
        )
    };
    let coarse_image = shrink(image);
    let coarse_template = shrink(template);
    if coarse_template.width() > coarse_image.width()
        || coarse_template.height() > coarse_image.height()
    {
        return Ok(full.best_in((0, full.max_x()), (0, full.max_y())));
    }

    let coarse = Scorer::new(&coarse_image, &coarse_template);
    // Fine patterns (1px text, dithering) average out when shrunk.
    if coarse.template.contrast() < full.template.contrast() * MIN_COARSE_CONTRAST {
        return Ok(full.best_in((0, full.max_x()), (0, full.max_y())));
    }
    let mut peaks = coarse.all_scores();
    peaks.sort_by(|a, b| b.score.total_cmp(&a.score));
    peaks.truncate(options.candidates.max(1));

    let radius = factor as usize;
    let best = peaks
        .iter()
        .map(|peak| {
            let cx = peak.x as usize * factor as usize;
            let cy = peak.y as usize * factor as usize;
            let xs = (
                cx.saturating_sub(radius).min(full.max_x()),
                (cx + radius).min(full.max_x()),
            );
            let ys = (
                cy.saturating_sub(radius).min(full.max_y()),
                (cy + radius).min(full.max_y()),
            );
            full.best_in(xs, ys)
        })
        .max_by(|a, b| a.score.total_cmp(&b.score))
        .ok_or_else(|| vision_error("no candidate positions"))?;
    Ok(best)
}

fn coarse_factor(template: &GrayImage, options: &MatchOptions) -> u32 {
    let side = template.width().min(template.height());
    (side / MIN_COARSE_SIDE).clamp(1, options.max_coarse_factor.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    /// Deterministic texture with plenty of local variation.
    fn textured(width: u32, height: u32) -> GrayImage {
        GrayImage::from_fn(width, height, |x, y| {
            let v = (x * 37 + y * 91 + (x * y) % 23 * 11) % 251;
            Luma([v as u8])
        })
    }

    fn crop(image: &GrayImage, x: u32, y: u32, w: u32, h: u32) -> GrayImage {
        imageops::crop_imm(image, x, y, w, h).to_image()
    }

    #[test]
    fn finds_exact_crop_with_full_score() {
        let image = textured(64, 48);
        let template = crop(&image, 20, 11, 9, 7);
        let found = best_match(&image, &template, &MatchOptions::exhaustive()).expect("match");
        assert_eq!((found.x, found.y), (20, 11));
        assert!((found.score - 1.0).abs() < 1e-4, "score {}", found.score);
    }

    #[test]
    fn score_is_invariant_to_brightness_and_contrast() {
        let image = textured(40, 40);
        let template = crop(&image, 5, 8, 10, 10);
        let mut brighter = image.clone();
        for pixel in brighter.pixels_mut() {
            pixel.0[0] = (pixel.0[0] / 2).saturating_add(60);
        }
        let found = best_match(&brighter, &template, &MatchOptions::exhaustive()).expect("match");
        assert_eq!((found.x, found.y), (5, 8));
        assert!(found.score > 0.99, "score {}", found.score);
    }

    #[test]
    fn coarse_search_refines_to_the_crop() {
        let image = GrayImage::from_fn(200, 160, |x, y| {
            let v = ((x / 3) * 53 + (y / 3) * 29 + ((x / 3) * (y / 3)) % 17 * 7) % 241;
            Luma([v as u8])
        });
        let template = crop(&image, 90, 60, 48, 36);
        let found = best_match(&image, &template, &MatchOptions::coarse(4)).expect("match");
        assert!(found.score > 0.99, "score {}", found.score);
        assert_eq!((found.x, found.y), (90, 60));
    }

    #[test]
    fn oversized_template_is_an_error() {
        let image = textured(10, 10);
        let template = textured(11, 4);
        assert!(best_match(&image, &template, &MatchOptions::exhaustive()).is_err());
    }

    #[test]
    fn flat_inputs_score_zero() {
        let flat = GrayImage::from_pixel(20, 20, Luma([128]));
        let template = textured(5, 5);
        let found = best_match(&flat, &template, &MatchOptions::exhaustive()).expect("match");
        assert_eq!(found.score, 0.0);

        let flat_template = GrayImage::from_pixel(5, 5, Luma([9]));
        let found = best_match(&textured(20, 20), &flat_template, &MatchOptions::exhaustive())
            .expect("match");
        assert_eq!(found.score, 0.0);
    }

    /// Smooth gradient with a 1px checkerboard banner pasted at (200, 300).
    fn checker_banner_screen() -> GrayImage {
        GrayImage::from_fn(360, 640, |x, y| {
            if (200..248).contains(&x) && (300..348).contains(&y) {
                Luma([if (x + y) % 2 == 0 { 20 } else { 235 }])
            } else {
                Luma([((x / 4 + y / 5) % 200) as u8 + 20])
            }
        })
    }

    #[test]
    fn default_search_finds_fine_detail() {
        let image = checker_banner_screen();
        let template = crop(&image, 200, 300, 48, 48);
        let found = best_match(&image, &template, &MatchOptions::default()).expect("match");
        assert_eq!((found.x, found.y), (200, 300));
        assert!(found.score > 0.999, "score {}", found.score);
    }

    #[test]
    fn coarse_search_falls_back_when_detail_is_lost() {
        let image = checker_banner_screen();
        let template = crop(&image, 200, 300, 48, 48);
        let found = best_match(&image, &template, &MatchOptions::coarse(4)).expect("match");
        assert_eq!((found.x, found.y), (200, 300));
        assert!(found.score > 0.999, "score {}", found.score);
    }

    #[test]
    fn coarse_factor_respects_template_size() {
        let options = MatchOptions::coarse(4);
        assert_eq!(coarse_factor(&textured(20, 100), &options), 1);
        assert_eq!(coarse_factor(&textured(36, 100), &options), 3);
        assert_eq!(coarse_factor(&textured(400, 120), &options), 4);
    }
}
