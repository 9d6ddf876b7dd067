use std::{
    collections::VecDeque,
    path::PathBuf,
    sync::Mutex,
};

use async_trait::async_trait;
use tapbot_types::{
    geometry::ReferenceCoordinate,
    setup::{SessionConfig, SessionSetup},
    vision::{TemplateImage, TemplateRole},
};
use tapbot_vision::TemplateDetector;

pub const PLAY: ReferenceCoordinate = ReferenceCoordinate::new(540, 1500);
pub const MOVE: ReferenceCoordinate = ReferenceCoordinate::new(400, 1000);
pub const PLAY_AGAIN: ReferenceCoordinate = ReferenceCoordinate::new(700, 1700);

pub fn template(role: TemplateRole) -> TemplateImage {
    TemplateImage {
        role,
        path: PathBuf::from(format!("{role}.png")),
        width: 2,
        height: 2,
        luma: vec![0, 255, 255, 0],
    }
}

pub fn complete_setup() -> SessionSetup {
    let mut setup = SessionSetup::new();
    setup
        .set_play(PLAY)
        .set_move(MOVE)
        .set_play_again(PLAY_AGAIN)
        .bind_template(template(TemplateRole::Won))
        .bind_template(template(TemplateRole::Lost));
    setup
}

pub fn session_config() -> SessionConfig {
    complete_setup().build().expect("complete setup")
}

/// Replays `(won, lost)` verdicts tick by tick. A "won" query starts a new
/// tick; once the script runs out every query misses.
pub struct ScriptedDetector {
    script: Mutex<VecDeque<(bool, bool)>>,
    current: Mutex<(bool, bool)>,
    queries: Mutex<Vec<TemplateRole>>,
}

impl ScriptedDetector {
    pub fn new(script: Vec<(bool, bool)>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            current: Mutex::new((false, false)),
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn queries(&self) -> Vec<TemplateRole> {
        self.queries.lock().expect("queries").clone()
    }
}

#[async_trait]
impl TemplateDetector for ScriptedDetector {
    async fn detect(&self, template: &TemplateImage, _threshold: f32) -> bool {
        self.queries.lock().expect("queries").push(template.role);
        let mut current = self.current.lock().expect("current");
        match template.role {
            TemplateRole::Won => {
                *current = self
                    .script
                    .lock()
                    .expect("script")
                    .pop_front()
                    .unwrap_or((false, false));
                current.0
            }
            TemplateRole::Lost => current.1,
        }
    }
}
