//! Setup phase: accumulating the coordinates and templates a session needs.

use std::{
    fmt, fs, io,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::{
    geometry::ReferenceCoordinate,
    vision::{TemplateImage, TemplateRole},
    Result, TapbotError,
};

/// One of the five values a session cannot start without.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SetupField {
    Play,
    Move,
    PlayAgain,
    WonImage,
    LostImage,
}

impl SetupField {
    pub const ALL: [SetupField; 5] = [
        SetupField::Play,
        SetupField::Move,
        SetupField::PlayAgain,
        SetupField::WonImage,
        SetupField::LostImage,
    ];

    /// Key used in the persisted setup file.
    pub fn key(self) -> &'static str {
        match self {
            SetupField::Play => "play_coords",
            SetupField::Move => "move_coords",
            SetupField::PlayAgain => "play_again_coords",
            SetupField::WonImage => "images.won",
            SetupField::LostImage => "images.lost",
        }
    }
}

impl fmt::Display for SetupField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl From<TemplateRole> for SetupField {
    fn from(role: TemplateRole) -> Self {
        match role {
            TemplateRole::Won => SetupField::WonImage,
            TemplateRole::Lost => SetupField::LostImage,
        }
    }
}

/// Builder filled in by the setup surface. The automation core only ever
/// sees the [`SessionConfig`] it produces.
#[derive(Debug, Clone, Default)]
pub struct SessionSetup {
    play: Option<ReferenceCoordinate>,
    move_: Option<ReferenceCoordinate>,
    play_again: Option<ReferenceCoordinate>,
    won: Option<TemplateImage>,
    lost: Option<TemplateImage>,
}

impl SessionSetup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_play(&mut self, coord: ReferenceCoordinate) -> &mut Self {
        self.play = Some(coord);
        self
    }

    pub fn set_move(&mut self, coord: ReferenceCoordinate) -> &mut Self {
        self.move_ = Some(coord);
        self
    }

    pub fn set_play_again(&mut self, coord: ReferenceCoordinate) -> &mut Self {
        self.play_again = Some(coord);
        self
    }

    /// Binds the template to the slot named by its role.
    pub fn bind_template(&mut self, template: TemplateImage) -> &mut Self {
        match template.role {
            TemplateRole::Won => self.won = Some(template),
            TemplateRole::Lost => self.lost = Some(template),
        }
        self
    }

    pub fn play(&self) -> Option<ReferenceCoordinate> {
        self.play
    }

    pub fn move_coords(&self) -> Option<ReferenceCoordinate> {
        self.move_
    }

    pub fn play_again(&self) -> Option<ReferenceCoordinate> {
        self.play_again
    }

    pub fn template(&self, role: TemplateRole) -> Option<&TemplateImage> {
        match role {
            TemplateRole::Won => self.won.as_ref(),
            TemplateRole::Lost => self.lost.as_ref(),
        }
    }

    pub fn missing_fields(&self) -> Vec<SetupField> {
        SetupField::ALL
            .into_iter()
            .filter(|field| match field {
                SetupField::Play => self.play.is_none(),
                SetupField::Move => self.move_.is_none(),
                SetupField::PlayAgain => self.play_again.is_none(),
                SetupField::WonImage => self.won.is_none(),
                SetupField::LostImage => self.lost.is_none(),
            })
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.missing_fields().is_empty()
    }

    pub fn build(&self) -> Result<SessionConfig> {
        match (
            self.play,
            self.move_,
            self.play_again,
            self.won.clone(),
            self.lost.clone(),
        ) {
            (Some(play), Some(move_coords), Some(play_again), Some(won), Some(lost)) => {
                Ok(SessionConfig {
                    play,
                    move_coords,
                    play_again,
                    won,
                    lost,
                })
            }
            _ => Err(TapbotError::IncompleteSetup(self.missing_fields())),
        }
    }
}

/// Fully populated, read-only input of the automation loop.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub play: ReferenceCoordinate,
    pub move_coords: ReferenceCoordinate,
    pub play_again: ReferenceCoordinate,
    pub won: TemplateImage,
    pub lost: TemplateImage,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TemplatePaths {
    pub won: Option<PathBuf>,
    pub lost: Option<PathBuf>,
}

impl TemplatePaths {
    pub fn get(&self, role: TemplateRole) -> Option<&Path> {
        match role {
            TemplateRole::Won => self.won.as_deref(),
            TemplateRole::Lost => self.lost.as_deref(),
        }
    }
}

/// On-disk form of the setup. Parsed strictly; nothing in it is executed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SetupFile {
    pub play_coords: Option<ReferenceCoordinate>,
    pub move_coords: Option<ReferenceCoordinate>,
    pub play_again_coords: Option<ReferenceCoordinate>,
    #[serde(default)]
    pub images: TemplatePaths,
}

impl SetupFile {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref).map_err(|err| {
            TapbotError::Persistence(format!(
                "unable to read setup file {}: {err}",
                path_ref.display()
            ))
        })?;
        Self::parse(&contents).map_err(|err| {
            TapbotError::Persistence(format!(
                "failed to parse setup file {}: {err}",
                path_ref.display()
            ))
        })
    }

    /// Like [`SetupFile::load`], but a file that does not exist yet is an
    /// empty setup. Any other read or parse failure is still an error, so
    /// callers never overwrite a setup they could not read.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        match fs::metadata(path.as_ref()) {
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            _ => Self::load(path),
        }
    }

    pub fn parse(contents: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path_ref = path.as_ref();
        let doc = toml::to_string(self)
            .map_err(|err| TapbotError::Persistence(format!("failed to encode setup: {err}")))?;
        if let Some(parent) = path_ref.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|err| {
                TapbotError::Persistence(format!(
                    "unable to create setup directory {}: {err}",
                    parent.display()
                ))
            })?;
        }
        fs::write(path_ref, doc).map_err(|err| {
            TapbotError::Persistence(format!(
                "unable to write setup file {}: {err}",
                path_ref.display()
            ))
        })
    }

    /// Copies the coordinates into a builder. Templates need decoding and
    /// are bound separately.
    pub fn coordinates_into(&self, setup: &mut SessionSetup) {
        if let Some(coord) = self.play_coords {
            setup.set_play(coord);
        }
        if let Some(coord) = self.move_coords {
            setup.set_move(coord);
        }
        if let Some(coord) = self.play_again_coords {
            setup.set_play_again(coord);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template(role: TemplateRole) -> TemplateImage {
        TemplateImage {
            role,
            path: PathBuf::from(format!("{role}.png")),
            width: 1,
            height: 1,
            luma: vec![0],
        }
    }

    fn complete_setup() -> SessionSetup {
        let mut setup = SessionSetup::new();
        setup
            .set_play(ReferenceCoordinate::new(540, 1500))
            .set_move(ReferenceCoordinate::new(540, 1000))
            .set_play_again(ReferenceCoordinate::new(540, 1650))
            .bind_template(template(TemplateRole::Won))
            .bind_template(template(TemplateRole::Lost));
        setup
    }

    #[test]
    fn complete_setup_builds() {
        let setup = complete_setup();
        assert!(setup.is_complete());
        let config = setup.build().expect("build");
        assert_eq!(config.move_coords, ReferenceCoordinate::new(540, 1000));
        assert_eq!(config.won.role, TemplateRole::Won);
        assert_eq!(config.lost.role, TemplateRole::Lost);
    }

    #[test]
    fn incomplete_setup_names_missing_fields() {
        let mut setup = SessionSetup::new();
        setup.set_move(ReferenceCoordinate::new(1, 2));
        setup.bind_template(template(TemplateRole::Lost));
        assert!(!setup.is_complete());
        match setup.build() {
            Err(TapbotError::IncompleteSetup(fields)) => assert_eq!(
                fields,
                vec![SetupField::Play, SetupField::PlayAgain, SetupField::WonImage]
            ),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn setup_file_roundtrip_on_disk() {
        let path = std::env::temp_dir().join("tapbot-setup-test.toml");
        let file = SetupFile {
            play_coords: Some(ReferenceCoordinate::new(540, 1500)),
            move_coords: None,
            play_again_coords: Some(ReferenceCoordinate::new(540, 1650)),
            images: TemplatePaths {
                won: Some(PathBuf::from("/sdcard/won.png")),
                lost: None,
            },
        };
        file.save(&path).expect("save setup");
        let loaded = SetupFile::load(&path).expect("load setup");
        assert_eq!(loaded, file);

        let mut setup = SessionSetup::new();
        loaded.coordinates_into(&mut setup);
        assert_eq!(setup.play(), Some(ReferenceCoordinate::new(540, 1500)));
        assert_eq!(setup.move_coords(), None);
        fs::remove_file(&path).expect("cleanup setup file");
    }

    #[test]
    fn missing_setup_file_loads_as_empty() {
        let path = std::env::temp_dir().join("tapbot-setup-does-not-exist.toml");
        let file = SetupFile::load_or_default(&path).expect("missing file is empty");
        assert_eq!(file, SetupFile::default());
    }

    #[test]
    fn malformed_setup_file_is_an_error_and_left_untouched() {
        let path = std::env::temp_dir().join("tapbot-setup-malformed.toml");
        let contents = "play_coords = { x = 540, y = 1500 }\nimages = \"oops\"\n";
        fs::write(&path, contents).expect("write setup");

        let err = SetupFile::load_or_default(&path).expect_err("malformed file");
        assert!(matches!(err, TapbotError::Persistence(_)));
        assert_eq!(fs::read_to_string(&path).expect("read back"), contents);
        fs::remove_file(&path).expect("cleanup setup file");
    }

    #[test]
    fn setup_file_rejects_unknown_or_malformed_input() {
        assert!(SetupFile::parse("play_coords = { x = 1, y = 2 }\nshell = \"rm -rf /\"\n").is_err());
        assert!(SetupFile::parse("play_coords = \"(1, 2)\"\n").is_err());
        assert!(SetupFile::parse("[images]\nwon = \"a.png\"\ndraw = \"b.png\"\n").is_err());
        let parsed = SetupFile::parse("move_coords = { x = 10, y = 20 }\n").expect("parse");
        assert_eq!(parsed.move_coords, Some(ReferenceCoordinate::new(10, 20)));
        assert_eq!(parsed.images, TemplatePaths::default());
    }

    #[test]
    fn missing_setup_file_is_persistence_error() {
        let path = std::env::temp_dir().join("tapbot-setup-does-not-exist.toml");
        assert!(matches!(
            SetupFile::load(&path),
            Err(TapbotError::Persistence(_))
        ));
    }
}
