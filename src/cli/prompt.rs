// Terminal credential collector
use async_trait::async_trait;
use std::io::{self, BufRead, Write};
use tracing::warn;

use crate::account::{CollectorInput, CredentialCollector, CredentialPrompt, Credentials};

/// Reads credentials from stdin. End of input counts as cancel.
pub struct TerminalCollector;

#[async_trait]
impl CredentialCollector for TerminalCollector {
    async fn collect(&mut self, prompt: &CredentialPrompt) -> CollectorInput {
        let prompt = prompt.clone();
        let read = tokio::task::spawn_blocking(move || {
            let stdin = io::stdin();
            let mut input = stdin.lock();
            read_credentials(&prompt, &mut input, &mut io::stdout())
        })
        .await;

        match read {
            Ok(Ok(Some(credentials))) => CollectorInput::Submit(credentials),
            Ok(Ok(None)) => CollectorInput::Cancel,
            Ok(Err(e)) => {
                warn!("Could not read credentials: {}", e);
                CollectorInput::Cancel
            }
            Err(e) => {
                warn!("Credential prompt task failed: {}", e);
                CollectorInput::Cancel
            }
        }
    }
}

fn read_line(input: &mut impl BufRead) -> io::Result<Option<String>> {
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
}

fn read_credentials(
    prompt: &CredentialPrompt,
    input: &mut impl BufRead,
    output: &mut impl Write,
) -> io::Result<Option<Credentials>> {
    if prompt.attempt == 1 {
        writeln!(output, "\n=== Sign in to {} ===", prompt.account_type)?;
    }
    if let Some(error) = &prompt.error {
        writeln!(output, "⚠️  {}", error)?;
    }

    let username = match (&prompt.username, prompt.username_locked) {
        (Some(locked), true) => {
            writeln!(output, "Username: {}", locked)?;
            locked.clone()
        }
        (suggested, _) => {
            match suggested {
                Some(name) if !name.is_empty() => write!(output, "Username [{}]: ", name)?,
                _ => write!(output, "Username: ")?,
            }
            output.flush()?;
            let Some(entered) = read_line(input)? else {
                return Ok(None);
            };
            match suggested {
                Some(name) if entered.trim().is_empty() => name.clone(),
                _ => entered,
            }
        }
    };

    write!(output, "Password: ")?;
    output.flush()?;
    let Some(password) = read_line(input)? else {
        return Ok(None);
    };

    Ok(Some(Credentials::new(username, password)))
}
