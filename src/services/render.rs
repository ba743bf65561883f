use super::{Coordinate, PolylineStyle};
use crate::viewport::Viewport;

/// Where markers, the route overlay and the viewport end up.
pub trait RenderSurface: Send {
    fn add_marker(&mut self, coordinate: Coordinate, label: &str);
    fn remove_all_markers(&mut self);
    fn draw_polyline(&mut self, points: &[Coordinate], style: PolylineStyle);
    fn remove_all_overlays(&mut self);
    fn set_viewport(&mut self, viewport: Viewport, animated: bool);

    /// Adjusts a region to the display's constraints before it is applied.
    fn region_that_fits(&self, viewport: Viewport) -> Viewport {
        viewport
    }
}
