/// Per-layer fetch state machine.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LayerFetchState {
    /// No fetch has started for this layer.
    #[default]
    Pending,

    /// Asking peers for the layer manifest.
    FetchingManifest,

    /// Fetching the epoch ATX set and the manifest's missing artifacts.
    FetchingArtifacts,

    /// Running validators over fetched artifacts.
    ///
    /// Rejected or missing artifacts send the layer back to
    /// `FetchingArtifacts` while the retry budget lasts.
    Validating,

    /// Every manifest artifact is stored and validated.
    Complete,

    /// The attempt gave up. The next sync tick starts over from `Pending`.
    Failed,
}

impl LayerFetchState {
    pub fn can_transition_to(&self, target: LayerFetchState) -> bool {
        use LayerFetchState::*;

        match self {
            Pending => matches!(target, FetchingManifest),
            FetchingManifest => matches!(target, FetchingArtifacts | Complete | Failed),
            FetchingArtifacts => matches!(target, Validating | Failed),
            Validating => matches!(target, FetchingArtifacts | Complete | Failed),
            Complete => false,
            Failed => matches!(target, Pending | FetchingManifest),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, LayerFetchState::Complete | LayerFetchState::Failed)
    }
}
