//! SteamCMD argument vector construction.

use std::fmt;

use crate::models::ServerEntry;

const REDACTED: &str = "********";

/// Account credentials for a non-anonymous login. Never persisted.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &REDACTED)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub enum Login {
    Anonymous,
    Account(Credentials),
}

/// Build the full argv (executable first) for updating `entry`.
///
/// Anonymous logins get the entry's extra args spliced in right before
/// `+app_update`; account logins do not carry extra args.
pub fn build_command(installer: &str, install_dir: &str, entry: &ServerEntry, login: &Login) -> Vec<String> {
    let app_id = entry.app_id.to_string();
    match login {
        Login::Anonymous => {
            let mut argv = Vec::with_capacity(9 + entry.args.len());
            argv.extend(
                [installer, "+force_install_dir", install_dir, "+login", "anonymous"].map(String::from),
            );
            argv.extend(entry.args.iter().cloned());
            argv.extend(["+app_update", app_id.as_str(), "validate", "+quit"].map(String::from));
            argv
        }
        Login::Account(creds) => [
            installer,
            "+login",
            creds.username.as_str(),
            creds.password.as_str(),
            "+force_install_dir",
            install_dir,
            "+app_update",
            app_id.as_str(),
            "validate",
            "+quit",
        ]
        .map(String::from)
        .to_vec(),
    }
}

/// argv joined for logs, with the password blanked out.
pub fn redacted(argv: &[String], login: &Login) -> String {
    match login {
        Login::Anonymous => argv.join(" "),
        Login::Account(creds) => argv
            .iter()
            .enumerate()
            .map(|(i, a)| {
                // The password always follows "+login <user>".
                if i == 3 && *a == creds.password {
                    REDACTED
                } else {
                    a.as_str()
                }
            })
            .collect::<Vec<_>>()
            .join(" "),
    }
}
