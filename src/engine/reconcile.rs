//! Mapping a candidate found in a screenshot back onto the device screen

use crate::error::RecogResult;
use crate::geometry::rect::round_half_up;
use crate::geometry::{FractionalRectangle, Rect, Size, offset_rect};
use crate::locator::Platform;
use crate::matching::MatchCandidate;
use serde::{Deserialize, Serialize};

/// Heights of the Android system bars, in screenshot pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemBars {
    pub status_bar_height: u32,
    pub navigation_bar_height: u32,
}

/// What the device reports about its screen, as opposed to what the screenshot shows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenProfile {
    pub platform: Platform,
    /// Size of the application window. `None` leaves rectangles in screenshot space.
    pub window_size: Option<Size>,
    pub system_bars: Option<SystemBars>,
}

impl ScreenProfile {
    pub fn android(window_size: Size, system_bars: SystemBars) -> Self {
        Self {
            platform: Platform::Android,
            window_size: Some(window_size),
            system_bars: Some(system_bars),
        }
    }

    pub fn ios(window_size: Size) -> Self {
        Self {
            platform: Platform::Ios,
            window_size: Some(window_size),
            system_bars: None,
        }
    }
}

/// Move a candidate found inside `cutout` back into the coordinates of the full image.
pub fn reverse_cutout(candidate: MatchCandidate, cutout: &Rect, full_size: Size) -> MatchCandidate {
    let rect = candidate.rect.translate(cutout.x, cutout.y);
    candidate.with_rect(rect).with_source_size(full_size)
}

fn rescale(rect: &Rect, captured: Size, window: Size) -> Rect {
    let x_prop = window.width as f64 / captured.width as f64;
    let y_prop = window.height as f64 / captured.height as f64;
    Rect::new(
        round_half_up(x_prop * rect.x as f64),
        round_half_up(y_prop * rect.y as f64),
        round_half_up(x_prop * rect.width as f64),
        round_half_up(y_prop * rect.height as f64),
    )
}

/// Correct `rect` for any difference between the screenshot and the window size.
pub fn correct_for_screen(rect: &Rect, captured: Size, screen: &ScreenProfile) -> Rect {
    let Some(window) = screen.window_size else {
        return *rect;
    };
    if captured == window || captured.is_empty() {
        return *rect;
    }

    if screen.platform == Platform::Android
        && let Some(bars) = screen.system_bars
        && captured.width == window.width
    {
        let status = bars.status_bar_height;
        let nav = bars.navigation_bar_height;
        if captured.height == window.height + status {
            log::debug!("Screenshot includes the status bar, shifting up by {status}");
            return rect.translate(0, -(status as i32));
        }
        if captured.height == window.height + nav || captured.height == window.height + status + nav
        {
            log::debug!("Screenshot includes the navigation bar, rectangle kept");
            return *rect;
        }
    }

    let corrected = rescale(rect, captured, window);
    log::debug!(
        "Rescaled {rect:?} from {}x{} to {}x{}: {corrected:?}",
        captured.width,
        captured.height,
        window.width,
        window.height
    );
    corrected
}

/// Final screen rectangle of a candidate: size correction, then the optional offset.
pub fn reconcile(
    candidate: &MatchCandidate,
    offset: Option<&FractionalRectangle>,
    screen: &ScreenProfile,
) -> RecogResult<Rect> {
    let corrected = correct_for_screen(&candidate.rect, candidate.source_size, screen);
    match offset {
        Some(offset) => offset_rect(&corrected, offset, candidate.source_size),
        None => Ok(corrected),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matching::MatchDetail;

    fn candidate(rect: Rect, source: Size) -> MatchCandidate {
        MatchCandidate::new(
            rect,
            source,
            0.95,
            MatchDetail::Template {
                resize_factor: 1.0,
                match_threshold: 0.8,
            },
        )
    }

    fn pixel() -> ScreenProfile {
        ScreenProfile::android(
            Size::new(1080, 2220),
            SystemBars {
                status_bar_height: 60,
                navigation_bar_height: 120,
            },
        )
    }

    #[test]
    fn test_reverse_cutout_translates_back() {
        let found = candidate(Rect::new(10, 10, 50, 50), Size::new(500, 500));
        let back = reverse_cutout(found, &Rect::new(100, 100, 500, 500), Size::new(1000, 1000));
        assert_eq!(back.rect, Rect::new(110, 110, 50, 50));
        assert_eq!(back.source_size, Size::new(1000, 1000));
    }

    #[test]
    fn test_equal_sizes_unchanged() {
        let rect = Rect::new(10, 20, 30, 40);
        assert_eq!(
            correct_for_screen(&rect, Size::new(1080, 2220), &pixel()),
            rect
        );
    }

    #[test]
    fn test_status_bar_shifts_up() {
        let rect = Rect::new(10, 200, 30, 40);
        assert_eq!(
            correct_for_screen(&rect, Size::new(1080, 2280), &pixel()),
            Rect::new(10, 140, 30, 40)
        );
    }

    #[test]
    fn test_navigation_bar_is_ignored() {
        let rect = Rect::new(10, 200, 30, 40);
        let screen = pixel();
        assert_eq!(correct_for_screen(&rect, Size::new(1080, 2340), &screen), rect);
        assert_eq!(correct_for_screen(&rect, Size::new(1080, 2400), &screen), rect);
    }

    #[test]
    fn test_other_sizes_rescale_proportionally() {
        // Retina style screenshot at twice the window size
        let screen = ScreenProfile::ios(Size::new(375, 812));
        let rect = Rect::new(101, 200, 51, 80);
        assert_eq!(
            correct_for_screen(&rect, Size::new(750, 1624), &screen),
            Rect::new(51, 100, 26, 40)
        );
    }

    #[test]
    fn test_unknown_window_leaves_rect() {
        let rect = Rect::new(1, 2, 3, 4);
        assert_eq!(
            correct_for_screen(&rect, Size::new(100, 100), &ScreenProfile::default()),
            rect
        );
    }

    #[test]
    fn test_offset_applies_after_correction() {
        let found = candidate(Rect::new(100, 260, 200, 100), Size::new(1080, 2280));
        let label = FractionalRectangle::new(1.0, 0.0, 0.5, 1.0);
        let rect = reconcile(&found, Some(&label), &pixel()).unwrap();
        assert_eq!(rect, Rect::new(300, 200, 100, 100));
    }
}
