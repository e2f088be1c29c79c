use crate::compose::plan::FramePlan;
use crate::compose::static_scene::StaticSceneCache;
use crate::compose::stats::DisplayStats;
use crate::config::DisplayConfig;
use crate::foundation::core::DisplayKind;

/// How the display's windows are fed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    /// Windows fetch from memory.
    #[default]
    Composited,
    /// A scaler unit streams into the windows through its local path.
    HardwareLocal,
}

/// Everything the composer remembers about one display between cycles.
#[derive(Clone, Debug)]
pub struct DisplayAllocatorState {
    pub(crate) kind: DisplayKind,
    pub(crate) config: DisplayConfig,
    pub(crate) connected: bool,
    pub(crate) output_mode: OutputMode,
    pub(crate) last_plan: Option<FramePlan>,
    pub(crate) static_scene: StaticSceneCache,
    pub(crate) stats: DisplayStats,
}

impl DisplayAllocatorState {
    pub(crate) fn new(kind: DisplayKind, config: DisplayConfig, connected: bool) -> Self {
        Self {
            kind,
            config,
            connected,
            output_mode: OutputMode::Composited,
            last_plan: None,
            static_scene: StaticSceneCache::default(),
            stats: DisplayStats::default(),
        }
    }

    /// Which display this is.
    pub fn kind(&self) -> DisplayKind {
        self.kind
    }

    /// Window/channel layout.
    pub fn config(&self) -> &DisplayConfig {
        &self.config
    }

    /// Return `true` while the display is plugged in.
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Current output mode.
    pub fn output_mode(&self) -> OutputMode {
        self.output_mode
    }

    /// Plan decided by the last `prepare`.
    pub fn last_plan(&self) -> Option<&FramePlan> {
        self.last_plan.as_ref()
    }

    /// Cumulative counters.
    pub fn stats(&self) -> DisplayStats {
        self.stats
    }

    /// Return `true` when the next unchanged frame can be replayed.
    pub fn has_static_scene(&self) -> bool {
        self.static_scene.is_primed()
    }

    /// Forget per-frame state after a teardown.
    pub(crate) fn reset(&mut self) {
        self.output_mode = OutputMode::Composited;
        self.last_plan = None;
        self.static_scene.invalidate();
    }
}
