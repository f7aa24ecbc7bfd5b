//! Combining several locators for one element

use super::{ImgRecogEngine, ResolvedElement, decode_screenshot};
use crate::error::{RecogError, RecogResult};
use crate::locator::LocatorSpec;
use image::DynamicImage;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainMode {
    /// Every locator must match, each one centred inside the previous match.
    Successive,
    /// The first locator that matches wins.
    #[default]
    Alternative,
}

impl ImgRecogEngine {
    /// Evaluate `specs` against one screenshot according to `mode`.
    pub fn find_element_chain(
        &self,
        specs: &[LocatorSpec],
        screenshot: &DynamicImage,
        mode: ChainMode,
    ) -> RecogResult<Option<ResolvedElement>> {
        if specs.is_empty() {
            return Err(RecogError::config("locators", "at least one locator is needed"));
        }
        match mode {
            ChainMode::Successive => self.successive(specs, screenshot),
            ChainMode::Alternative => self.alternative(specs, screenshot),
        }
    }

    pub fn find_element_chain_in_bytes(
        &self,
        specs: &[LocatorSpec],
        screenshot: &[u8],
        mode: ChainMode,
    ) -> RecogResult<Option<ResolvedElement>> {
        if specs.is_empty() {
            return Err(RecogError::config("locators", "at least one locator is needed"));
        }
        self.find_element_chain(specs, &decode_screenshot(screenshot)?, mode)
    }

    fn successive(
        &self,
        specs: &[LocatorSpec],
        screenshot: &DynamicImage,
    ) -> RecogResult<Option<ResolvedElement>> {
        let Some(mut current) = self.find_element(&specs[0], screenshot)? else {
            log::info!("Locator 0 ({}) found nothing", specs[0].method_name());
            return Ok(None);
        };
        for (i, spec) in specs.iter().enumerate().skip(1) {
            let Some(next) = self.find_element(spec, screenshot)? else {
                log::info!("Locator {i} ({}) found nothing", spec.method_name());
                return Ok(None);
            };
            if !current.rect().contains_center_of(&next.rect()) {
                log::info!(
                    "Locator {i} matched at {:?}, centre outside the previous match {:?}",
                    next.rect(),
                    current.rect()
                );
                return Ok(None);
            }
            log::debug!("Locator {i} confirmed inside {:?}", current.rect());
            current = next;
        }
        Ok(Some(current.with_locators(specs.to_vec())))
    }

    fn alternative(
        &self,
        specs: &[LocatorSpec],
        screenshot: &DynamicImage,
    ) -> RecogResult<Option<ResolvedElement>> {
        for (i, spec) in specs.iter().enumerate() {
            if let Some(found) = self.find_element(spec, screenshot)? {
                log::debug!("Locator {i} ({}) matched", spec.method_name());
                return Ok(Some(found));
            }
            log::debug!("Locator {i} ({}) found nothing, trying the next", spec.method_name());
        }
        Ok(None)
    }
}
