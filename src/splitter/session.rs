//! Engine session lifetime and the password retry state machine.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::splitter::credentials::CredentialProvider;
use crate::splitter::error::{Result, ToolError};
use crate::splitter::io::{OpenError, SourceDocument, SpreadsheetEngine};

/// Default number of password attempts before giving up.
pub const DEFAULT_MAX_PASSWORD_ATTEMPTS: u32 = 3;

/// Quits the wrapped engine when dropped.
struct EngineGuard<E: SpreadsheetEngine>(E);

impl<E: SpreadsheetEngine> Drop for EngineGuard<E> {
    fn drop(&mut self) {
        self.0.quit();
        debug!("spreadsheet engine released");
    }
}

/// One started engine and the source document it opened.
///
/// Dropping the session closes the document and then quits the engine,
/// whichever way the caller leaves its scope.
pub struct Session<E: SpreadsheetEngine> {
    // Field order matters: the document is released before the engine.
    document: E::Document,
    path: PathBuf,
    _engine: EngineGuard<E>,
}

impl<E: SpreadsheetEngine> Session<E> {
    pub fn document_mut(&mut self) -> &mut E::Document {
        &mut self.document
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl<E: SpreadsheetEngine> Drop for Session<E> {
    fn drop(&mut self) {
        self.document.close();
        debug!(path = %self.path.display(), "source document closed");
    }
}

#[derive(Debug)]
enum AuthState {
    Attempting {
        attempt: u32,
        password: Option<String>,
    },
    Failed {
        attempts: u32,
        password_tried: bool,
    },
}

/// Opens source documents, retrying rejected passwords a bounded number of times.
#[derive(Debug, Clone, Copy)]
pub struct SessionManager {
    max_attempts: u32,
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PASSWORD_ATTEMPTS)
    }
}

impl SessionManager {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Starts `engine` and opens `path`.
    ///
    /// The first attempt uses `password`; each later attempt asks `credentials`
    /// for a replacement. A document that needs no password opens on the first
    /// attempt whatever was supplied. Every open counts against the limit,
    /// including a first one made without a password.
    pub fn open<E, C>(
        &self,
        mut engine: E,
        path: &Path,
        password: Option<String>,
        credentials: &mut C,
    ) -> Result<Session<E>>
    where
        E: SpreadsheetEngine,
        C: CredentialProvider + ?Sized,
    {
        engine.start().map_err(ToolError::EngineUnavailable)?;
        let mut guard = EngineGuard(engine);

        let mut used = 0u32;
        let mut password_tried = false;
        let mut state = AuthState::Attempting {
            attempt: 1,
            password,
        };

        loop {
            state = match state {
                AuthState::Attempting { attempt, password } => {
                    debug!(attempt, with_password = password.is_some(), "opening source document");
                    match guard.0.open(path, password.as_deref()) {
                        Ok(document) => {
                            info!(path = %path.display(), "source document opened");
                            return Ok(Session {
                                document,
                                path: path.to_path_buf(),
                                _engine: guard,
                            });
                        }
                        Err(OpenError::PasswordRequired) | Err(OpenError::WrongPassword) => {
                            used = attempt;
                            if password.is_some() {
                                password_tried = true;
                                warn!(attempt, max = self.max_attempts, "password rejected");
                            } else {
                                info!("source document is password protected");
                            }
                            if used >= self.max_attempts {
                                AuthState::Failed {
                                    attempts: used,
                                    password_tried,
                                }
                            } else {
                                let next = used + 1;
                                match credentials.request_password(next)? {
                                    Some(password) => AuthState::Attempting {
                                        attempt: next,
                                        password: Some(password),
                                    },
                                    None => AuthState::Failed {
                                        attempts: used,
                                        password_tried,
                                    },
                                }
                            }
                        }
                        Err(OpenError::Unsupported(reason)) | Err(OpenError::Read(reason)) => {
                            return Err(ToolError::OpenFailed {
                                path: path.to_path_buf(),
                                reason,
                            });
                        }
                    }
                }
                AuthState::Failed {
                    password_tried: false,
                    ..
                } => {
                    return Err(ToolError::PasswordRequired(path.to_path_buf()));
                }
                AuthState::Failed { attempts, .. } => {
                    return Err(ToolError::AuthenticationFailed {
                        path: path.to_path_buf(),
                        attempts,
                    });
                }
            };
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::splitter::io::UsedRange;

    /// Shared record of what a [`FakeEngine`] was asked to do.
    #[derive(Debug, Default)]
    pub(crate) struct EngineLog {
        pub started: u32,
        pub quit: u32,
        pub attempts: Vec<Option<String>>,
    }

    /// In-memory engine: one workbook behind an optional password.
    pub(crate) struct FakeEngine {
        pub password: Option<String>,
        pub sheets: Vec<(String, UsedRange)>,
        pub fail_start: bool,
        pub log: Rc<RefCell<EngineLog>>,
    }

    impl FakeEngine {
        pub(crate) fn new(password: Option<&str>) -> Self {
            Self {
                password: password.map(str::to_string),
                sheets: Vec::new(),
                fail_start: false,
                log: Rc::default(),
            }
        }

        pub(crate) fn with_sheet(mut self, name: &str, rows: Vec<Vec<&str>>) -> Self {
            let rows = rows
                .into_iter()
                .map(|row| row.into_iter().map(str::to_string).collect())
                .collect();
            self.sheets
                .push((name.to_string(), UsedRange { first_row: 1, rows }));
            self
        }
    }

    pub(crate) struct FakeDocument {
        sheets: Vec<(String, UsedRange)>,
    }

    impl SourceDocument for FakeDocument {
        fn sheet_names(&self) -> Vec<String> {
            self.sheets.iter().map(|(name, _)| name.clone()).collect()
        }

        fn used_range(&mut self, sheet: &str) -> Result<UsedRange> {
            self.sheets
                .iter()
                .find(|(name, _)| name == sheet)
                .map(|(_, range)| range.clone())
                .ok_or_else(|| ToolError::WorksheetNotFound(sheet.to_string()))
        }
    }

    impl SpreadsheetEngine for FakeEngine {
        type Document = FakeDocument;

        fn start(&mut self) -> std::result::Result<(), String> {
            self.log.borrow_mut().started += 1;
            if self.fail_start {
                Err("engine not installed".to_string())
            } else {
                Ok(())
            }
        }

        fn open(
            &mut self,
            _path: &Path,
            password: Option<&str>,
        ) -> std::result::Result<FakeDocument, OpenError> {
            self.log
                .borrow_mut()
                .attempts
                .push(password.map(str::to_string));
            match (&self.password, password) {
                (None, _) => {}
                (Some(_), None) => return Err(OpenError::PasswordRequired),
                (Some(expected), Some(given)) if expected != given => {
                    return Err(OpenError::WrongPassword);
                }
                _ => {}
            }
            Ok(FakeDocument {
                sheets: self.sheets.clone(),
            })
        }

        fn quit(&mut self) {
            self.log.borrow_mut().quit += 1;
        }
    }
}
