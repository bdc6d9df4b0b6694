use crate::errors::Ck101Error;
use reqwest::Client;
use std::time::Duration;
use tokio::sync::Mutex;

pub const DEFAULT_LOGIN_URL: &str = "http://ck101.com/member.php?mod=logging&action=login&loginsubmit=yes&infloat=yes&lssubmit=yes&inajax=1";
const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/108.0.0.0 Safari/537.36";

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Endpoint receiving the login form
    pub login_url: String,
    pub user_agent: String,
    /// Per request timeout. None means a request may block indefinitely.
    pub timeout: Option<Duration>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            login_url: DEFAULT_LOGIN_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Credentials {
    username: String,
    /// Lowercase hex md5 of the password. The raw password is never kept.
    password_hash: String,
}

#[derive(Debug, Default)]
struct AuthState {
    credentials: Option<Credentials>,
    /// Set once the login exchange has run, whatever its outcome.
    authenticated: bool,
}

/// Cookie bearing http context shared by every request of one run.
#[derive(Debug)]
pub struct Session {
    client: Client,
    login_url: String,
    state: Mutex<AuthState>,
}

impl Session {
    /// Credentials are only kept when both username and password are non empty.
    pub fn new(
        username: Option<&str>,
        password: Option<&str>,
        config: SessionConfig,
    ) -> Result<Self, Ck101Error> {
        let credentials = match (username, password) {
            (Some(u), Some(p)) if !u.is_empty() && !p.is_empty() => Some(Credentials {
                username: u.to_string(),
                password_hash: hash_password(p),
            }),
            _ => None,
        };

        let mut builder = Client::builder()
            .user_agent(config.user_agent)
            .cookie_store(true);
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let client = match builder.build() {
            Ok(c) => c,
            Err(e) => {
                tracing::error!("Failed to build http client\nError : {}", e);
                return Err(Ck101Error::UnknownError(e.to_string()));
            }
        };

        Ok(Self {
            client,
            login_url: config.login_url,
            state: Mutex::new(AuthState {
                credentials,
                authenticated: false,
            }),
        })
    }

    pub fn anonymous(config: SessionConfig) -> Result<Self, Ck101Error> {
        Self::new(None, None, config)
    }

    pub(crate) fn client(&self) -> &Client {
        &self.client
    }

    /// True when credentials survived the login exchange.
    pub async fn is_logged_in(&self) -> bool {
        let state = self.state.lock().await;
        state.authenticated && state.credentials.is_some()
    }

    /// Runs the login exchange once. Later calls are no-ops.
    ///
    /// Without credentials this succeeds without touching the network. A failed
    /// login clears the credentials and returns [`Ck101Error::Auth`]; the session
    /// stays usable for anonymous requests.
    #[tracing::instrument(skip(self))]
    pub async fn authenticate(&self) -> Result<(), Ck101Error> {
        let mut state = self.state.lock().await;
        if state.authenticated {
            return Ok(());
        }
        state.authenticated = true;

        let credentials = match state.credentials.clone() {
            None => return Ok(()),
            Some(c) => c,
        };

        let form = [
            ("username", credentials.username.as_str()),
            ("password", credentials.password_hash.as_str()),
            ("quickforward", "yes"),
            ("handlekey", "ls"),
        ];
        let response = self
            .client
            .post(&self.login_url)
            .form(&form)
            .send()
            .await
            .and_then(|r| r.error_for_status());

        match response {
            Ok(_) => {
                tracing::debug!("Logged in as {}", credentials.username);
                Ok(())
            }
            Err(e) => {
                tracing::warn!(
                    "Login failed for {}, continuing anonymously\nError : {}",
                    credentials.username,
                    e
                );
                state.credentials = None;
                Err(Ck101Error::Auth(e.to_string()))
            }
        }
    }
}

fn hash_password(password: &str) -> String {
    format!("{:x}", md5::compute(password))
}
