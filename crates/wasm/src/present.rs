use std::collections::HashMap;

use pagewalk_core::{PlayerState, Presenter, Sprite};
use serde::Deserialize;
use web_sys::HtmlImageElement;

/// Image source per sprite, keyed like `{"STANDING": "...", "RUNNING_LEFT": "..."}`.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(transparent)]
pub struct SpriteSheet(HashMap<String, String>);

impl SpriteSheet {
    pub fn source(&self, sprite: Sprite) -> Option<&str> {
        self.0.get(sprite.as_str()).map(String::as_str)
    }

    pub fn missing(&self) -> Vec<&'static str> {
        Sprite::ALL
            .iter()
            .filter(|s| self.source(**s).is_none())
            .map(|s| s.as_str())
            .collect()
    }
}

/// Inline style that anchors the sprite at the page origin.
const PINNED_STYLE: [(&str, &str); 3] = [("position", "absolute"), ("top", "0px"), ("left", "0px")];

/// Moves an `<img>` with a CSS transform and swaps its source on state change.
pub struct SpritePresenter {
    image: HtmlImageElement,
    sheet: SpriteSheet,
}

impl SpritePresenter {
    /// Pins the image to the page origin so the transform alone places it,
    /// and shows the standing sprite.
    pub fn new(image: HtmlImageElement, sheet: SpriteSheet) -> Self {
        let style = image.style();
        for (name, value) in PINNED_STYLE {
            if let Err(e) = style.set_property(name, value) {
                web_sys::console::error_2(&format!("pagewalk: could not set sprite {name}").into(), &e);
            }
        }
        let mut presenter = Self { image, sheet };
        presenter.set_sprite(PlayerState::Standing);
        presenter
    }
}

impl Presenter for SpritePresenter {
    fn set_transform(&mut self, x: f32, y: f32) {
        let value = format!("translate({x}px, {y}px)");
        if let Err(e) = self.image.style().set_property("transform", &value) {
            web_sys::console::error_2(&"pagewalk: could not move sprite".into(), &e);
        }
    }

    fn set_sprite(&mut self, state: PlayerState) {
        let Some(src) = self.sheet.source(state.sprite()) else {
            return;
        };
        // the browser resolves `src` to an absolute URL, so compare the attribute
        if self.image.get_attribute("src").as_deref() != Some(src) {
            self.image.set_src(src);
        }
    }
}
