/// Patterns marking a shell command as destructive: executing one requires
/// the confirmation callback to approve first, whether it came from a deploy
/// plan step or a diagnoser-suggested fix.
const DESTRUCTIVE_PATTERNS: &[&str] = &[
    "rm ",
    "rm -",
    "rmdir",
    "delete",
    "kill ",
    "kill -",
    "pkill",
    "killall",
    "sudo ",
    "chmod ",
    "chown ",
    "docker rm",
    "docker rmi",
    "docker stop",
    "docker kill",
    "> ",
    ">> ",
    "mv ",
    "cp -f",
];

/// Blocked shell metacharacter tokens. A command containing one of these
/// outside of an explicit allow-list is rejected before it ever reaches a
/// subprocess.
const BLOCKED_TOKENS: &[&str] = &[";", "&&", "||"];

pub fn is_destructive_command(command: &str) -> bool {
    let lower = command.to_ascii_lowercase();
    let trimmed = lower.trim();
    DESTRUCTIVE_PATTERNS
        .iter()
        .any(|pattern| trimmed.contains(pattern))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandBlocked {
    pub token: String,
}

impl CommandBlocked {
    /// Matches the message format the original implementation's blocked-command
    /// path used, verbatim, since the diagnoser's Tier 1 local rule table
    /// pattern-matches against this exact phrase.
    pub fn message(&self) -> String {
        format!("Command blocked: Dangerous pattern detected: '{}'", self.token)
    }
}

/// Checks a shell command against the closed block list of dangerous
/// metacharacter patterns before it is allowed to reach a subprocess.
pub fn check_shell_command(command: &str) -> Result<(), CommandBlocked> {
    for token in BLOCKED_TOKENS {
        if command.contains(token) {
            return Err(CommandBlocked {
                token: (*token).to_string(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_destructive_rm() {
        assert!(is_destructive_command("rm -rf /tmp/old"));
    }

    #[test]
    fn test_destructive_docker_rm() {
        assert!(is_destructive_command("docker rm -f web"));
    }

    #[test]
    fn test_non_destructive_read() {
        assert!(!is_destructive_command("docker ps -a"));
    }

    #[test]
    fn test_blocked_semicolon() {
        let result = check_shell_command("python -c 'import secrets; print(secrets.token_hex())'");
        assert!(result.is_err());
        let blocked = result.unwrap_err();
        assert_eq!(blocked.token, ";");
        assert!(blocked.message().contains("Dangerous pattern detected"));
    }

    #[test]
    fn test_blocked_chain() {
        assert!(check_shell_command("docker build . && docker run img").is_err());
    }

    #[test]
    fn test_allowed_plain_command() {
        assert!(check_shell_command("docker ps --filter name=^web$").is_ok());
    }
}
