/*!
Defines a simple command snapshotting mechanism.

Every snapshot records whether the command succeeded, its exit code, and its
stdout and stderr. Commands are built with an owned builder that wraps
`std::process::Command`, which makes it easy to derive one command from
another in tests.

This module has no dependencies on the rest of the test suite.
*/

use std::{
    collections::BTreeMap,
    env::consts::EXE_SUFFIX,
    ffi::{OsStr, OsString},
    io::Write,
    path::{Path, PathBuf},
    process, thread,
};

use bstr::{BStr, BString, ByteSlice, ByteVec};

macro_rules! run_and_snapshot {
    ($cmd:expr, $body:expr) => {{
        let snap = $cmd.snapshot();
        let mut settings = insta::Settings::clone_current();
        settings.set_info(snap.info());
        settings.set_omit_expression(true);
        settings.bind(|| ($body)(snap.snapshot()));
    }};
}

macro_rules! assert_cmd_snapshot {
    ($spawnable:expr, @$snapshot:literal $(,)?) => {{
        $crate::command::run_and_snapshot!($spawnable, |snapshot: &str| {
            insta::assert_snapshot!(snapshot, @$snapshot);
        });
    }};
}

pub(crate) use {assert_cmd_snapshot, run_and_snapshot};

/// A snapshot generated from running a command.
pub struct Snapshot {
    /// Shown in `cargo insta review`, but not part of the snapshot.
    info: CommandInfo,
    snapshot: String,
    stdout: BString,
}

impl Snapshot {
    fn new(info: CommandInfo, output: &process::Output) -> Snapshot {
        let snapshot = format!(
            "success: {:?}\n\
             exit_code: {}\n\
             ----- stdout -----\n\
             {}\n\
             ----- stderr -----\n\
             {}",
            output.status.success(),
            output.status.code().unwrap_or(!0),
            bytes_to_string(&output.stdout),
            bytes_to_string(&output.stderr),
        );
        let stdout = BString::from(output.stdout.as_bstr());
        Snapshot { info, snapshot, stdout }
    }

    pub fn info(&self) -> &CommandInfo {
        &self.info
    }

    pub fn snapshot(&self) -> &str {
        &self.snapshot
    }

    /// Returns the raw stdout of the command that was run.
    pub fn stdout(&self) -> &BStr {
        self.stdout.as_bstr()
    }
}

/// A command along with the bytes to feed to its stdin.
#[derive(Debug)]
pub struct WithStdin {
    cmd: Command,
    stdin: BString,
}

impl WithStdin {
    /// Run the command, writing stdin from another thread so that a large
    /// input can't deadlock against a full stdout pipe.
    pub fn snapshot(&self) -> Snapshot {
        let mut cmd = self.cmd.std();
        cmd.stdin(process::Stdio::piped());
        cmd.stdout(process::Stdio::piped());
        cmd.stderr(process::Stdio::piped());
        let mut child = cmd.spawn().unwrap();
        let mut child_stdin = child.stdin.take().unwrap();
        let stdin = self.stdin.clone();
        let writer = thread::spawn(move || child_stdin.write_all(&stdin));
        let output = child.wait_with_output().unwrap();
        writer.join().unwrap().unwrap();

        let mut info = self.cmd.info();
        info.stdin = Some(bytes_to_string(&self.stdin));
        Snapshot::new(info, &output)
    }
}

/// An owned builder wrapping `std::process::Command`.
///
/// Only the builder API is wrapped. I/O handles are set up when a snapshot
/// is taken.
#[derive(Clone, Debug)]
pub struct Command {
    bin: OsString,
    current_dir: Option<PathBuf>,
    args: Vec<OsString>,
    envs: Vec<EnvAction>,
}

impl Command {
    pub fn new(bin: impl AsRef<OsStr>) -> Command {
        Command {
            bin: bin.as_ref().to_os_string(),
            current_dir: None,
            args: vec![],
            envs: vec![],
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Command {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args(
        mut self,
        args: impl IntoIterator<Item = impl AsRef<OsStr>>,
    ) -> Command {
        for arg in args {
            self = self.arg(arg);
        }
        self
    }

    pub fn env(
        mut self,
        key: impl AsRef<OsStr>,
        val: impl AsRef<OsStr>,
    ) -> Command {
        self.envs.push(EnvAction::Set(
            key.as_ref().to_os_string(),
            val.as_ref().to_os_string(),
        ));
        self
    }

    /// Remove an environment variable (also prevents inheriting from the
    /// parent process).
    pub fn env_remove(mut self, key: impl AsRef<OsStr>) -> Command {
        self.envs.push(EnvAction::Remove(key.as_ref().to_os_string()));
        self
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Command {
        self.current_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Returns this command with the given data passed to its stdin.
    pub fn stdin(self, stdin: impl Into<Vec<u8>>) -> WithStdin {
        WithStdin { cmd: self, stdin: BString::from(stdin.into()) }
    }

    /// Turn this wrapper into a fresh `std::process::Command`.
    pub fn std(&self) -> process::Command {
        let mut cmd = process::Command::new(&self.bin);
        if let Some(ref current_dir) = self.current_dir {
            cmd.current_dir(current_dir);
        }
        cmd.args(self.args.iter());
        for action in self.envs.iter() {
            match *action {
                EnvAction::Set(ref key, ref val) => {
                    cmd.env(key, val);
                }
                EnvAction::Remove(ref key) => {
                    cmd.env_remove(key);
                }
            }
        }
        cmd
    }

    /// Runs this command with a closed stdin and snapshots its output.
    pub fn snapshot(&self) -> Snapshot {
        let output = self
            .std()
            .stdin(process::Stdio::null())
            .output()
            .unwrap();
        Snapshot::new(self.info(), &output)
    }

    pub fn info(&self) -> CommandInfo {
        CommandInfo::new(&self.std())
    }
}

#[derive(Clone, Debug)]
enum EnvAction {
    Set(OsString, OsString),
    Remove(OsString),
}

/// Information about a particular command, shown in the `cargo insta
/// review` user interface.
#[derive(Clone, Debug, serde::Serialize)]
pub struct CommandInfo {
    bin: String,
    args: Vec<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    env: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stdin: Option<String>,
}

impl CommandInfo {
    fn new(cmd: &process::Command) -> CommandInfo {
        let bin = Path::new(cmd.get_program())
            .file_name()
            .map(os_str_to_string)
            .unwrap_or_else(|| "{UNKNOWN}".to_string());
        let bin = bin.strip_suffix(EXE_SUFFIX).unwrap_or(&bin).to_string();
        CommandInfo {
            bin,
            args: cmd.get_args().map(os_str_to_string).collect(),
            env: cmd
                .get_envs()
                .map(|(k, v)| {
                    (
                        os_str_to_string(k),
                        os_str_to_string(v.unwrap_or(OsStr::new(""))),
                    )
                })
                .collect(),
            stdin: None,
        }
    }
}

/// Return a command prepared to execute the binary with the given name.
///
/// When running under `cross`, the binary is run through its runner.
pub fn bin(name: &str) -> Command {
    let bin = bin_path(name);
    match cross_runner() {
        None => Command::new(bin),
        Some(runner) => Command::new(runner).arg(bin),
    }
}

/// Returns a path to the Cargo project binary with the given name.
fn bin_path(name: &str) -> PathBuf {
    std::env::current_exe()
        .unwrap()
        .parent()
        .expect("executable's directory")
        .parent()
        .expect("target profile directory")
        .join(format!("{name}{}", EXE_SUFFIX))
}

fn cross_runner() -> Option<String> {
    let runner = std::env::var("CROSS_RUNNER").ok()?;
    if runner.is_empty() || runner == "empty" {
        return None;
    }
    Some(format!("qemu-{}", std::env::consts::ARCH))
}

/// Turns bytes into a readable string, escaping invalid UTF-8.
fn bytes_to_string(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(string) => string.to_string(),
        Err(_) => bytes.escape_bytes().to_string(),
    }
}

fn os_str_to_string(os_str: &OsStr) -> String {
    bytes_to_string(&Vec::from_os_str_lossy(os_str))
}
