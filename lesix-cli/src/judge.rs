use std::io::{ErrorKind, Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use lesix_db::models::Domain;
use lesix_engine::judge::{parse_verdict, Judge, JudgeError, JudgeRequest, JudgeVerdict};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

// Codes de sortie de sysexits.h.
const EX_UNAVAILABLE: i32 = 69;
const EX_TEMPFAIL: i32 = 75;
const EX_NOPERM: i32 = 77;

/// Juge externe : la requête JSON part sur l'entrée standard, le verdict
/// est lu sur la sortie standard. Le code de sortie classe les échecs.
pub struct CommandJudge {
    program: String,
    args: Vec<String>,
    timeout: Duration,
    domain: Domain,
}

impl CommandJudge {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration, domain: Domain) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
            domain,
        }
    }

    /// Découpe la ligne de commande sur les espaces, sans interprétation
    /// des guillemets.
    pub fn from_command_line(command: &str, timeout: Duration, domain: Domain) -> Result<Self> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let Some(program) = parts.next() else {
            bail!("Commande de juge vide");
        };
        Ok(Self::new(program, parts.collect(), timeout, domain))
    }

    /// Attend la fin du juge jusqu'à `started + timeout`, puis le tue.
    fn wait_with_timeout(&self, child: &mut Child, started: Instant) -> Result<ExitStatus, JudgeError> {
        loop {
            match child.try_wait() {
                Ok(Some(status)) => return Ok(status),
                Ok(None) if started.elapsed() >= self.timeout => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(JudgeError::Timeout(self.timeout));
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(e) => return Err(JudgeError::Transient(e.to_string())),
            }
        }
    }
}

/// Erreur associée à un code de sortie non nul (`None` : tué par un signal).
pub fn classify_exit(code: Option<i32>) -> JudgeError {
    match code {
        Some(EX_TEMPFAIL) => JudgeError::Transient("échec temporaire signalé par le juge".to_string()),
        Some(EX_NOPERM) => JudgeError::QuotaExhausted,
        Some(EX_UNAVAILABLE) => JudgeError::Unavailable("juge indisponible".to_string()),
        Some(code) => JudgeError::Unavailable(format!("code de sortie {}", code)),
        None => JudgeError::Transient("juge interrompu par un signal".to_string()),
    }
}

impl Judge for CommandJudge {
    fn name(&self) -> &str {
        &self.program
    }

    fn rerank(&self, request: &JudgeRequest) -> Result<JudgeVerdict, JudgeError> {
        let payload =
            serde_json::to_vec(request).map_err(|e| JudgeError::Malformed(e.to_string()))?;

        let started = Instant::now();
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound | ErrorKind::PermissionDenied => {
                    JudgeError::Unavailable(format!("{} : {}", self.program, e))
                }
                _ => JudgeError::Transient(e.to_string()),
            })?;

        // Écriture et lecture hors du thread appelant : un juge qui ne lit pas
        // sa requête ou garde sa sortie ouverte ne bloque pas le délai.
        if let Some(mut stdin) = child.stdin.take() {
            let program = self.program.clone();
            thread::spawn(move || {
                if let Err(e) = stdin.write_all(&payload) {
                    log::debug!("Requête partiellement transmise au juge {} : {}", program, e);
                }
            });
        }
        let stdout = child.stdout.take();
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let mut buf = String::new();
            let read = match stdout {
                Some(mut out) => out.read_to_string(&mut buf).map(|_| buf),
                None => Ok(buf),
            };
            let _ = tx.send(read);
        });

        let status = self.wait_with_timeout(&mut child, started)?;
        let remaining = self.timeout.saturating_sub(started.elapsed()).max(POLL_INTERVAL);
        let output = match rx.recv_timeout(remaining) {
            Ok(read) => read.map_err(|e| JudgeError::Transient(e.to_string()))?,
            Err(RecvTimeoutError::Timeout) => return Err(JudgeError::Timeout(self.timeout)),
            Err(RecvTimeoutError::Disconnected) => {
                return Err(JudgeError::Transient(
                    "lecture de la réponse interrompue".to_string(),
                ))
            }
        };

        if !status.success() {
            return Err(classify_exit(status.code()));
        }
        parse_verdict(&output, &self.domain)
    }
}
