// crates/topgun-harness/tests/common/mod.rs
// ============================================================================
// Module: Harness Test Fixtures
// Description: Fake deploy tool, fake CLI, and fake control plane.
// Purpose: Exercise deployment bring-up and teardown without real infrastructure.
// Dependencies: tempfile, tiny_http
// ============================================================================

//! ## Overview
//! [`FakeBosh`] is a shell script that answers the deploy tool's subcommands
//! from files in its own directory and appends every invocation to
//! `calls.log`; deploying a manifest whose name contains `broken` fails.
//! [`FakeAtc`] is a `tiny_http` server that serves the token endpoint, the
//! worker and container listings, and the container runtime's destroy
//! endpoint on one port.

#![allow(
    dead_code,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    reason = "Shared fixtures; not every test binary uses every helper."
)]

use std::io::Read;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use tempfile::TempDir;
use tiny_http::Header;
use tiny_http::Method;
use tiny_http::Request;
use tiny_http::Response;
use tiny_http::Server;
use topgun_harness::HarnessConfig;
use topgun_harness::PollPolicy;

/// `base64("fly:Zmx5")`, the CLI's client credentials.
const CLIENT_BASIC: &str = "Basic Zmx5OlpteDU=";

/// Token handed out for valid credentials.
pub const ACCESS_TOKEN: &str = "topgun-test-token";

// ============================================================================
// SECTION: Fake Deploy Tool
// ============================================================================

const BOSH_SCRIPT: &str = r#"#!/bin/sh
dir="$(dirname "$0")"
echo "$*" >> "$dir/calls.log"
while [ $# -gt 0 ]; do
  case "$1" in
    -n) shift ;;
    -d) shift 2 ;;
    *) break ;;
  esac
done
cmd="$1"
shift
case "$cmd" in
  deploy)
    case "$1" in
      *broken*)
        echo "Task 8. Error"
        echo "Error: instance group 'web' failed to start: bind: address in use" >&2
        exit 1
        ;;
      *two-instance*) cp "$dir/two.listing" "$dir/current.listing" ;;
      *) cp "$dir/one.listing" "$dir/current.listing" ;;
    esac
    echo "Task 7. Done"
    ;;
  instances) cat "$dir/current.listing" 2>/dev/null ;;
  logs)
    echo "tailing"
    exec sleep 600
    ;;
  stop|start) echo "$1" >> "$dir/$cmd.log" ;;
  ssh) echo "ran $3 on $1" ;;
  delete-deployment) rm -f "$dir/current.listing" ;;
  *)
    echo "unknown command $cmd" >&2
    exit 1
    ;;
esac
"#;

/// Deploy tool stand-in living in its own temporary directory.
pub struct FakeBosh {
    dir: TempDir,
}

impl FakeBosh {
    /// Installs the script and listings. The web instance resolves to
    /// loopback; workers get distinct unroutable addresses.
    pub fn install() -> Self {
        let dir = TempDir::new().unwrap();
        write_executable(&dir.path().join("bosh"), BOSH_SCRIPT);
        write_executable(&dir.path().join("fly"), "#!/bin/sh\nexit 0\n");
        std::fs::write(dir.path().join("one.listing"), listing(&["10.244.0.4"])).unwrap();
        std::fs::write(dir.path().join("two.listing"), listing(&["10.244.0.4", "10.244.0.5"]))
            .unwrap();
        Self {
            dir,
        }
    }

    /// Returns the script path.
    pub fn program(&self) -> PathBuf {
        self.dir.path().join("bosh")
    }

    /// Returns the always-succeeding CLI stand-in.
    pub fn fly(&self) -> PathBuf {
        self.dir.path().join("fly")
    }

    /// Returns a manifest path inside the fixture directory.
    pub fn manifest(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Returns every recorded invocation, one argument string per call.
    pub fn calls(&self) -> Vec<String> {
        read_lines(&self.dir.path().join("calls.log"))
    }

    /// Returns how many recorded invocations contain `needle`.
    pub fn count(&self, needle: &str) -> usize {
        self.calls().iter().filter(|call| call.contains(needle)).count()
    }

    /// Returns instances passed to `stop`.
    pub fn stopped(&self) -> Vec<String> {
        read_lines(&self.dir.path().join("stop.log"))
    }

    /// Builds a configuration pointing at the fakes.
    pub fn config(&self) -> HarnessConfig {
        HarnessConfig {
            deploy_tool: self.program(),
            fly_binary: self.fly(),
            warmup: Duration::ZERO,
            web_job: "atc".to_string(),
            db_job: "postgres".to_string(),
            ..HarnessConfig::default()
        }
    }
}

fn listing(workers: &[&str]) -> String {
    let mut out = String::from(
        "Deployment 'concourse-topgun'\n\n\
         Instance    Process  State    AZ  IPs\n\
         web/0       -        running  z1  127.0.0.1\n\
         ~           atc      running  -   -\n\
         ~           tsa      running  -   -\n",
    );
    for (index, address) in workers.iter().enumerate() {
        out.push_str(&format!("worker/{index}    -        running  z1  {address}\n"));
        out.push_str("~           worker   running  -   -\n");
    }
    out.push_str("\nSucceeded\n");
    out
}

fn write_executable(path: &Path, body: &str) {
    std::fs::write(path, body).unwrap();
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
}

fn read_lines(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .map(|text| text.lines().map(str::to_string).collect())
        .unwrap_or_default()
}

// ============================================================================
// SECTION: Fake Control Plane
// ============================================================================

/// Behaviour knobs for [`FakeAtc`].
#[derive(Clone)]
pub struct AtcOptions {
    /// Accepted username.
    pub username: String,
    /// Accepted password.
    pub password: String,
    /// Status returned for container destroy requests.
    pub destroy_status: u16,
    /// Container handles placed on the single worker.
    pub containers: Vec<String>,
}

impl Default for AtcOptions {
    fn default() -> Self {
        Self {
            username: "test".to_string(),
            password: "test".to_string(),
            destroy_status: 204,
            containers: Vec::new(),
        }
    }
}

/// Control plane and container runtime stand-in on one loopback port.
pub struct FakeAtc {
    server: Arc<Server>,
    port: u16,
    requests: Arc<Mutex<Vec<String>>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl FakeAtc {
    /// Starts serving in a background thread.
    pub fn start(options: AtcOptions) -> Self {
        let server = Arc::new(Server::http("127.0.0.1:0").unwrap());
        let port = server.server_addr().to_ip().unwrap().port();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let handle = {
            let server = Arc::clone(&server);
            let requests = Arc::clone(&requests);
            thread::spawn(move || {
                for request in server.incoming_requests() {
                    let line = format!("{} {}", request.method(), request.url());
                    requests.lock().unwrap().push(line);
                    respond(request, &options, port);
                }
            })
        };
        Self {
            server,
            port,
            requests,
            handle: Some(handle),
        }
    }

    /// Returns the listening port.
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Returns the base URL.
    pub fn url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    /// Returns `METHOD path` for every request served so far.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    /// A reachability policy short enough for tests.
    pub const fn quick_policy() -> PollPolicy {
        PollPolicy::new(Duration::from_secs(5), Duration::from_millis(50))
    }
}

impl Drop for FakeAtc {
    fn drop(&mut self) {
        self.server.unblock();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn respond(mut request: Request, options: &AtcOptions, port: u16) {
    let method = request.method().clone();
    let url = request.url().to_string();
    let response = match (method, url.as_str()) {
        (Method::Post, "/sky/token") => {
            let basic = header(&request, "Authorization");
            let mut body = String::new();
            let _ = request.as_reader().read_to_string(&mut body);
            let fields: Vec<&str> = body.split('&').collect();
            let user_ok = fields.contains(&format!("username={}", options.username).as_str());
            let pass_ok = fields.contains(&format!("password={}", options.password).as_str());
            if basic.as_deref() == Some(CLIENT_BASIC) && user_ok && pass_ok {
                json(
                    200,
                    &format!(
                        r#"{{"access_token":"{ACCESS_TOKEN}","token_type":"Bearer","expires_in":3600}}"#
                    ),
                )
            } else {
                json(401, r#"{"error":"invalid_grant"}"#)
            }
        }
        (Method::Get, "/api/v1/workers") => json(
            200,
            &format!(
                r#"[{{"name":"worker-0","addr":"127.0.0.1:{port}","state":"running","active_containers":{}}}]"#,
                options.containers.len()
            ),
        ),
        (Method::Get, "/api/v1/teams/main/containers") => {
            let items: Vec<String> = options
                .containers
                .iter()
                .map(|id| format!(r#"{{"id":"{id}","worker_name":"worker-0","type":"task"}}"#))
                .collect();
            json(200, &format!("[{}]", items.join(",")))
        }
        (Method::Delete, path) if path.starts_with("/containers/") => {
            Response::from_string("").with_status_code(options.destroy_status)
        }
        _ => Response::from_string("not found").with_status_code(404),
    };
    let _ = request.respond(response);
}

fn header(request: &Request, name: &'static str) -> Option<String> {
    request
        .headers()
        .iter()
        .find(|header| header.field.equiv(name))
        .map(|header| header.value.as_str().to_string())
}

fn json(status: u16, body: &str) -> Response<std::io::Cursor<Vec<u8>>> {
    Response::from_string(body)
        .with_status_code(status)
        .with_header(Header::from_bytes("Content-Type", "application/json").unwrap())
}
