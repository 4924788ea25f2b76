use dialoguer::theme::ColorfulTheme;
use dialoguer::Confirm;
use tracing::debug;
use tuffix_installer::Confirmer;

/// Terminal prompt; a prompt error or Esc/`q` counts as a refusal.
#[derive(Default)]
pub(crate) struct TerminalConfirmer {
    theme: ColorfulTheme,
}

impl Confirmer for TerminalConfirmer {
    fn confirm(&mut self, prompt: &str) -> bool {
        match Confirm::with_theme(&self.theme)
            .with_prompt(prompt)
            .default(false)
            .interact_opt()
        {
            Ok(answer) => answer.unwrap_or(false),
            Err(err) => {
                debug!(error = %err, "confirmation prompt failed");
                false
            }
        }
    }
}
