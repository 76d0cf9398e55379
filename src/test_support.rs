//! Test support utilities shared across unit and integration tests.

use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::env;
use std::ffi::OsString;
use std::rc::Rc;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::cluster::{ClusterClient, ClusterConnector, ClusterError, ClusterSettings, PoolContext};
use crate::command::{CommandError, CommandOutput, CommandRunner};
use crate::config::DriverConfig;

/// Scripted command runner that answers invocations without spawning
/// processes.
///
/// Responses registered with [`ScriptedRunner::respond`] are matched against
/// the exact argument vector and may be served any number of times. Anything
/// else is answered from the FIFO queue filled by the `push_*` methods.
#[derive(Clone, Debug, Default)]
pub struct ScriptedRunner {
    stubs: Rc<RefCell<Vec<(CommandInvocation, CommandOutput)>>>,
    responses: Rc<RefCell<VecDeque<CommandOutput>>>,
    invocations: Rc<RefCell<Vec<CommandInvocation>>>,
}

/// Records a single invocation made through [`ScriptedRunner`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandInvocation {
    /// Program name as passed to the runner.
    pub program: String,
    /// Arguments passed to the program.
    pub args: Vec<OsString>,
}

impl CommandInvocation {
    /// Builds an invocation from a program and string arguments.
    #[must_use]
    pub fn new(program: &str, args: &[&str]) -> Self {
        Self {
            program: program.to_owned(),
            args: args.iter().map(OsString::from).collect(),
        }
    }

    /// Returns a shell-like command string for assertions.
    #[must_use]
    pub fn command_string(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(self.program.clone());
        parts.extend(
            self.args
                .iter()
                .map(|arg| arg.to_string_lossy().into_owned()),
        );
        parts.join(" ")
    }
}

impl ScriptedRunner {
    /// Creates a new runner with no queued responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all invocations recorded so far.
    #[must_use]
    pub fn invocations(&self) -> Vec<CommandInvocation> {
        self.invocations.borrow().clone()
    }

    /// Returns the recorded invocations rendered as command strings.
    #[must_use]
    pub fn command_strings(&self) -> Vec<String> {
        self.invocations
            .borrow()
            .iter()
            .map(CommandInvocation::command_string)
            .collect()
    }

    /// Answers every invocation of `program args` with `output`.
    ///
    /// A later registration for the same invocation replaces the earlier one.
    pub fn respond(&self, program: &str, args: &[&str], output: CommandOutput) {
        let invocation = CommandInvocation::new(program, args);
        let mut stubs = self.stubs.borrow_mut();
        stubs.retain(|(existing, _)| existing != &invocation);
        stubs.push((invocation, output));
    }

    /// Answers every invocation of `program args` with a successful `stdout`.
    pub fn respond_success(&self, program: &str, args: &[&str], stdout: &str) {
        self.respond(program, args, CommandOutput::success(stdout));
    }

    /// Pushes a successful exit status.
    pub fn push_success(&self) {
        self.responses
            .borrow_mut()
            .push_back(CommandOutput::success(""));
    }

    /// Pushes a failing exit code with stderr text.
    pub fn push_failure(&self, code: i32) {
        self.responses
            .borrow_mut()
            .push_back(CommandOutput::failure(code, "simulated failure"));
    }

    /// Pushes an explicit command output response.
    pub fn push_output(
        &self,
        code: Option<i32>,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) {
        self.responses.borrow_mut().push_back(CommandOutput {
            code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        });
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, CommandError> {
        let invocation = CommandInvocation {
            program: program.to_owned(),
            args: args.to_vec(),
        };
        self.invocations.borrow_mut().push(invocation.clone());

        let stubbed = self
            .stubs
            .borrow()
            .iter()
            .find(|(candidate, _)| candidate == &invocation)
            .map(|(_, output)| output.clone());
        if let Some(output) = stubbed {
            return Ok(output);
        }

        self.responses
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| CommandError::Spawn {
                program: program.to_owned(),
                message: format!(
                    "no scripted response available for `{}`",
                    invocation.command_string()
                ),
            })
    }
}

#[derive(Debug, Default)]
struct ClusterState {
    pools: BTreeMap<String, BTreeMap<String, u64>>,
    connect_failure: Option<String>,
    shutdowns: u32,
    pool_closes: u32,
}

/// In-memory cluster double implementing the connector, client and pool
/// traits. Clones share state, so a test can keep one handle for assertions
/// while the driver owns another.
#[derive(Clone, Debug, Default)]
pub struct MemoryCluster {
    state: Rc<RefCell<ClusterState>>,
}

impl MemoryCluster {
    /// Creates a cluster containing the named, empty pools.
    #[must_use]
    pub fn with_pools(pools: &[&str]) -> Self {
        let cluster = Self::default();
        {
            let mut state = cluster.state.borrow_mut();
            for pool in pools {
                state.pools.insert((*pool).to_owned(), BTreeMap::new());
            }
        }
        cluster
    }

    /// Adds an empty pool if it does not exist yet.
    pub fn insert_pool(&self, pool: &str) {
        self.state
            .borrow_mut()
            .pools
            .entry(pool.to_owned())
            .or_default();
    }

    /// Makes every subsequent connect attempt fail with `message`.
    pub fn fail_connect(&self, message: &str) {
        self.state.borrow_mut().connect_failure = Some(message.to_owned());
    }

    /// Adds an image directly, bypassing the catalog.
    pub fn insert_image(&self, pool: &str, image: &str, size_bytes: u64) {
        self.state
            .borrow_mut()
            .pools
            .entry(pool.to_owned())
            .or_default()
            .insert(image.to_owned(), size_bytes);
    }

    /// Returns the image names in `pool`.
    #[must_use]
    pub fn images(&self, pool: &str) -> Vec<String> {
        self.state
            .borrow()
            .pools
            .get(pool)
            .map(|images| images.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns the size of `image` in `pool`, if present.
    #[must_use]
    pub fn image_size(&self, pool: &str, image: &str) -> Option<u64> {
        self.state
            .borrow()
            .pools
            .get(pool)
            .and_then(|images| images.get(image).copied())
    }

    /// Number of client shutdowns observed.
    #[must_use]
    pub fn shutdowns(&self) -> u32 {
        self.state.borrow().shutdowns
    }

    /// Number of pool context closes observed.
    #[must_use]
    pub fn pool_closes(&self) -> u32 {
        self.state.borrow().pool_closes
    }

    /// Opens a pool context directly, bypassing the session.
    #[must_use]
    pub fn pool_handle(&self, pool: &str) -> MemoryPool {
        MemoryPool {
            state: Rc::clone(&self.state),
            pool: pool.to_owned(),
        }
    }
}

impl ClusterConnector for MemoryCluster {
    type Client = MemoryClient;

    fn connect(&self, _settings: &ClusterSettings) -> Result<Self::Client, ClusterError> {
        if let Some(message) = self.state.borrow().connect_failure.clone() {
            return Err(ClusterError::Connection { message });
        }
        Ok(MemoryClient {
            state: Rc::clone(&self.state),
        })
    }
}

/// Client handle returned by [`MemoryCluster`].
#[derive(Clone, Debug)]
pub struct MemoryClient {
    state: Rc<RefCell<ClusterState>>,
}

impl ClusterClient for MemoryClient {
    type Pool = MemoryPool;

    fn pool_exists(&self, pool: &str) -> Result<bool, ClusterError> {
        Ok(self.state.borrow().pools.contains_key(pool))
    }

    fn open_pool(&self, pool: &str) -> Result<Self::Pool, ClusterError> {
        Ok(MemoryPool {
            state: Rc::clone(&self.state),
            pool: pool.to_owned(),
        })
    }

    fn shutdown(&mut self) {
        self.state.borrow_mut().shutdowns += 1;
    }
}

/// Pool context returned by [`MemoryClient`].
#[derive(Clone, Debug)]
pub struct MemoryPool {
    state: Rc<RefCell<ClusterState>>,
    pool: String,
}

impl MemoryPool {
    fn not_found(&self, image: &str) -> ClusterError {
        ClusterError::ImageNotFound {
            image: image.to_owned(),
            pool: self.pool.clone(),
        }
    }
}

impl PoolContext for MemoryPool {
    fn list_images(&self) -> Result<Vec<String>, ClusterError> {
        Ok(self
            .state
            .borrow()
            .pools
            .get(&self.pool)
            .map(|images| images.keys().cloned().collect())
            .unwrap_or_default())
    }

    fn create_image(&self, image: &str, size_bytes: u64) -> Result<(), ClusterError> {
        let mut state = self.state.borrow_mut();
        let images = state.pools.entry(self.pool.clone()).or_default();
        if images.contains_key(image) {
            return Err(ClusterError::ImageExists {
                image: image.to_owned(),
                pool: self.pool.clone(),
            });
        }
        images.insert(image.to_owned(), size_bytes);
        Ok(())
    }

    fn remove_image(&self, image: &str) -> Result<(), ClusterError> {
        let removed = self
            .state
            .borrow_mut()
            .pools
            .get_mut(&self.pool)
            .and_then(|images| images.remove(image));
        removed.map(|_| ()).ok_or_else(|| self.not_found(image))
    }

    fn image_size(&self, image: &str) -> Result<u64, ClusterError> {
        let size = self
            .state
            .borrow()
            .pools
            .get(&self.pool)
            .and_then(|images| images.get(image).copied());
        size.ok_or_else(|| self.not_found(image))
    }

    fn close(&mut self) {
        self.state.borrow_mut().pool_closes += 1;
    }
}

/// Header printed by `rbd showmapped`.
pub const SHOWMAPPED_HEADER: &str = "id pool       image            snap device    ";

/// Renders `rbd showmapped` output for `(pool, image, device)` rows.
#[must_use]
pub fn showmapped_output(rows: &[(&str, &str, &str)]) -> String {
    let mut output = String::from(SHOWMAPPED_HEADER);
    output.push('\n');
    for (index, (pool, image, device)) in rows.iter().enumerate() {
        output.push_str(&format!("{}  {pool}  {image}  -  {device} \n", index + 1));
    }
    output
}

/// Output of `rbd status` for an image nobody has open.
pub const NO_WATCHERS: &str = "Watchers: none\n";

/// Output of `rbd status` for an image with one watcher.
pub const ONE_WATCHER: &str =
    "Watchers:\n\twatcher=172.31.14.48:0/1953528273 client.5153 cookie=2\n";

/// Returns a valid configuration using `pool` and the default tool names.
#[must_use]
pub fn driver_config(pool: &str) -> DriverConfig {
    DriverConfig {
        cluster_name: String::new(),
        user_id: String::from("admin"),
        conf_path: String::from("/etc/ceph/ceph.conf"),
        storage_pool: pool.to_owned(),
        rbd_bin: String::from("rbd"),
        ceph_bin: String::from("ceph"),
        hostname_bin: String::from("hostname"),
    }
}

/// Global mutex used to serialise environment mutation in tests.
pub static ENV_LOCK: Mutex<()> = Mutex::new(());

/// Guard that holds the env mutex and restores variables on drop.
pub struct EnvGuard {
    previous: Vec<(String, Option<OsString>)>,
    _guard: MutexGuard<'static, ()>,
}

impl EnvGuard {
    /// Sets multiple environment variables while holding a global mutex.
    #[must_use]
    pub fn set_vars(pairs: &[(&str, &str)]) -> Self {
        let guard = ENV_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
        let mut previous = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            let old = env::var_os(key);
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`, preventing races.
            unsafe { env::set_var(key, value) };
            previous.push(((*key).to_owned(), old));
        }

        Self {
            previous,
            _guard: guard,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, old) in self.previous.iter().rev() {
            // SAFETY: Environment mutation is serialised by holding `_guard`.
            unsafe {
                match old {
                    Some(val) => env::set_var(key, val),
                    None => env::remove_var(key),
                }
            }
        }
    }
}
