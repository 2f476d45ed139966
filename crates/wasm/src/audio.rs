use js_sys::Function;
use pagewalk_core::soundscape::AudioBackend;
use pagewalk_core::{PlaybackError, SoundEvent, SoundHandler, SoundPayload};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::HtmlAudioElement;

use crate::to_js;

fn reason(value: &JsValue) -> String {
    value.as_string().unwrap_or_else(|| format!("{value:?}"))
}

/// `HTMLAudioElement` voices. Rejected `play()` promises (autoplay policy,
/// decode errors) are caught and dropped.
pub struct HtmlAudioBackend {
    swallow: Closure<dyn FnMut(JsValue)>,
}

impl Default for HtmlAudioBackend {
    fn default() -> Self {
        Self {
            swallow: Closure::new(|_: JsValue| {}),
        }
    }
}

impl AudioBackend for HtmlAudioBackend {
    type Voice = HtmlAudioElement;

    fn create_voice(&self, src: &str) -> Result<HtmlAudioElement, PlaybackError> {
        let audio = HtmlAudioElement::new_with_src(src).map_err(|e| PlaybackError::Create {
            source_url: src.to_owned(),
            reason: reason(&e),
        })?;
        audio.set_preload("auto");
        Ok(audio)
    }

    fn duplicate(&self, voice: &HtmlAudioElement) -> Result<HtmlAudioElement, PlaybackError> {
        let create = |e: JsValue| PlaybackError::Create {
            source_url: voice.src(),
            reason: reason(&e),
        };
        voice.clone_node().map_err(create)?.dyn_into::<HtmlAudioElement>().map_err(|n| create(n.into()))
    }

    fn is_idle(&self, voice: &HtmlAudioElement) -> bool {
        voice.paused() || voice.ended()
    }

    fn play(&self, voice: &HtmlAudioElement, volume: f32, rate: f32) -> Result<(), PlaybackError> {
        voice.set_volume(volume as f64);
        voice.set_playback_rate(rate as f64);
        voice.set_current_time(0.0);
        let promise = voice.play().map_err(|e| PlaybackError::Rejected {
            source_url: voice.src(),
            reason: reason(&e),
        })?;
        let _ = promise.catch(&self.swallow);
        Ok(())
    }
}

/// `onSound(eventType, payload)` supplied from JavaScript.
pub struct JsSoundHandler(pub Function);

impl SoundHandler for JsSoundHandler {
    fn handle(&self, event: SoundEvent, payload: &SoundPayload) {
        let event = JsValue::from_str(event.as_str());
        if let Err(e) = self.0.call2(&JsValue::NULL, &event, &to_js(payload)) {
            web_sys::console::error_2(&"pagewalk: onSound threw".into(), &e);
        }
    }
}
