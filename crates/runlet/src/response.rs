use std::time::Duration;

use crate::runtime::ExecOutcome;

pub const TIMEOUT_EXIT_CODE: i32 = 124;

#[derive(Debug, Clone)]
pub struct RunResponse {
    pub exit_code: i32,
    pub timed_out: bool,
    pub stdout: String,
    pub stderr: String,
}

impl RunResponse {
    pub fn from_outcome(outcome: ExecOutcome, timeout: Duration) -> Self {
        match outcome {
            ExecOutcome::Completed(result) => Self {
                exit_code: result.exit_code,
                timed_out: false,
                stdout: decode(result.stdout),
                stderr: decode(result.stderr),
            },
            ExecOutcome::TimedOut { stdout, stderr } => {
                let mut stderr = decode(stderr);
                if !stderr.is_empty() && !stderr.ends_with('\n') {
                    stderr.push('\n');
                }
                stderr.push_str(&format!(
                    "runlet: execution timed out after {} seconds\n",
                    timeout.as_secs()
                ));
                Self {
                    exit_code: TIMEOUT_EXIT_CODE,
                    timed_out: true,
                    stdout: decode(stdout),
                    stderr,
                }
            }
        }
    }

    pub fn into_body(self) -> String {
        if self.exit_code == 0 {
            self.stdout
        } else {
            self.stderr
        }
    }
}

fn decode(bytes: Vec<u8>) -> String {
    String::from_utf8_lossy(&bytes).into_owned()
}
