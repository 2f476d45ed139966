use std::collections::BTreeMap;

use pagewalk_core::{ElementGeometry, ElementHandle, Extents, PageHost, Rect};
use web_sys::{DomRect, Element};

fn window_scroll() -> (f32, f32) {
    let Some(window) = web_sys::window() else {
        return (0.0, 0.0);
    };
    let x = window.scroll_x().unwrap_or(0.0);
    let y = window.scroll_y().unwrap_or(0.0);
    (x as f32, y as f32)
}

/// Client rectangle shifted into document coordinates.
fn to_page(rect: &DomRect, scroll: (f32, f32)) -> Rect {
    Rect::new(
        rect.x() as f32 + scroll.0,
        rect.y() as f32 + scroll.1,
        rect.width() as f32,
        rect.height() as f32,
    )
}

/// Measures registered elements in the live document.
#[derive(Default)]
pub struct DomHost {
    elements: BTreeMap<ElementHandle, Element>,
}

impl DomHost {
    pub fn insert(&mut self, handle: ElementHandle, element: Element) {
        self.elements.insert(handle, element);
    }

    pub fn remove(&mut self, handle: ElementHandle) -> Option<Element> {
        self.elements.remove(&handle)
    }

    pub fn handle_of(&self, element: &Element) -> Option<ElementHandle> {
        self.elements
            .iter()
            .find(|(_, e)| *e == element)
            .map(|(handle, _)| *handle)
    }
}

impl PageHost for DomHost {
    fn document_extents(&self) -> Extents {
        let root = web_sys::window()
            .and_then(|w| w.document())
            .and_then(|d| d.document_element());
        match root {
            Some(root) => Extents {
                width: root.scroll_width() as f32,
                height: root.scroll_height() as f32,
            },
            None => Extents::default(),
        }
    }

    fn measure_element(&self, handle: ElementHandle) -> Option<ElementGeometry> {
        let element = self.elements.get(&handle)?;
        if !element.is_connected() {
            return None;
        }

        let scroll = window_scroll();
        let bounds = to_page(&element.get_bounding_client_rect(), scroll);
        let list = element.get_client_rects();
        let fragments = (0..list.length())
            .filter_map(|i| list.get(i))
            .map(|r| to_page(&r, scroll))
            .collect();
        Some(ElementGeometry { bounds, fragments })
    }
}
