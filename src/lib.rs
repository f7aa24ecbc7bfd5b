//! Locate elements in device screenshots by template, keypoint feature or text matching,
//! and map the located rectangles back onto the device screen.

pub mod capability;
pub mod engine;
pub mod error;
pub mod geometry;
pub mod locator;
pub mod matching;

pub use engine::{ChainMode, ImgRecogEngine, LazyElement, ResolvedElement, ScreenProfile, SystemBars};
pub use error::{RecogError, RecogResult};
pub use geometry::{FractionalRectangle, Rect, Size};
pub use locator::{LocatorSpec, Method, Platform};
