use tapbot_types::{
    setup::{SessionSetup, SetupFile},
    vision::TemplateRole,
};
use tapbot_vision::load_template;
use tracing::{error, info};

/// Builds a [`SessionSetup`] from the persisted file. Templates that fail to
/// load stay unbound, so the start gate reports them as missing.
pub fn hydrate_setup(file: &SetupFile) -> SessionSetup {
    let mut setup = SessionSetup::new();
    file.coordinates_into(&mut setup);
    for role in [TemplateRole::Won, TemplateRole::Lost] {
        let Some(path) = file.images.get(role) else {
            continue;
        };
        match load_template(path, role) {
            Ok(template) => {
                info!(
                    "Loaded {} template {} ({}x{})",
                    role,
                    path.display(),
                    template.width,
                    template.height
                );
                setup.bind_template(template);
            }
            Err(err) => error!("{}", err),
        }
    }
    setup
}
