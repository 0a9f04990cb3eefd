/// Command stream recording state
///
/// Uploads that fold their transfer into a frame's command stream need to know where the
/// stream is in its recording lifecycle. Backend command lists expose that state here.

/// Recording state of a backend command stream
pub trait CommandStream {
    /// True between `begin` and `end`
    fn is_recording(&self) -> bool;

    /// True while a rendering scope (render pass / dynamic rendering) is open
    fn in_render_pass(&self) -> bool;

    /// Number of draw commands recorded since `begin`
    fn draw_count(&self) -> u32;
}
