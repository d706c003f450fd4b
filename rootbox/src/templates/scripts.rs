//! Startup routine, management interface and SSH helper scripts.

use std::fmt::Write as _;
use std::path::PathBuf;

use crate::runtime::constants::{filenames, instance_defaults};
use crate::runtime::layout::dirs;
use crate::runtime::types::InstanceDescriptor;
use crate::templates::catalog::CatalogEntry;
use crate::templates::image::IN_CONTAINER_ENV;
use crate::templates::sh_quote;

const RULE: &str = "==========================================";

const SSH_OPTIONS: &str = "-o StrictHostKeyChecking=no -o UserKnownHostsFile=/dev/null";

/// Helpers for driving an instance without a container runtime. The local
/// routine leads its own process group so stop reaches its children.
const LOCAL_FALLBACK: &str = r#"local_running() {
    [ -f "$PID_FILE" ] && kill -0 "$(cat "$PID_FILE")" 2>/dev/null
}

start_local() {
    mkdir -p "$(dirname "$LOG_FILE")"
    setsid bash "$STARTUP" >> "$LOG_FILE" 2>&1 < /dev/null &
    echo $! > "$PID_FILE"
    echo "Status: RUNNING (local process $!)"
}

stop_local() {
    PID=$(cat "$PID_FILE")
    kill -TERM -"$PID" 2>/dev/null || kill -TERM "$PID" 2>/dev/null
    rm -f "$PID_FILE"
}

require_container() {
    if [ -f "$PID_FILE" ]; then
        echo "$1 is unsupported in degraded mode: no container is running" >&2
        exit 1
    fi
}
"#;

// ============================================================================
// STARTUP ROUTINE
// ============================================================================

/// Entry point of the instance: print connection info, then heartbeat forever.
///
/// Runs as the container's main process, or directly on the host in
/// degraded mode. sshd is only started inside a container; on the host the
/// web port is served from `data/` when python3 is available.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartupRoutine {
    pub display_name: String,
    pub os_name: String,
    pub username: String,
    pub host: String,
    pub ssh_port: u16,
    pub web_port: u16,
    pub heartbeat_secs: u64,
}

impl StartupRoutine {
    pub fn for_instance(
        descriptor: &InstanceDescriptor,
        entry: &CatalogEntry,
        heartbeat_secs: u64,
    ) -> Self {
        Self {
            display_name: descriptor.display_name.clone(),
            os_name: entry.display_name.to_string(),
            username: descriptor.credentials.username.clone(),
            host: instance_defaults::HOST.to_string(),
            ssh_port: descriptor.endpoints.ssh_port,
            web_port: descriptor.endpoints.web_port,
            heartbeat_secs,
        }
    }

    pub fn render(&self) -> String {
        let mut s = String::new();
        let _ = writeln!(s, "#!/bin/bash");
        let _ = writeln!(s, "# Startup routine for instance {}", one_line(&self.display_name));
        let _ = writeln!(s);
        let _ = writeln!(s, "NAME={}", sh_quote(&self.display_name));
        let _ = writeln!(s, "OS_NAME={}", sh_quote(&self.os_name));
        let _ = writeln!(s, "LOGIN_USER={}", sh_quote(&self.username));
        let _ = writeln!(s, "HOST={}", sh_quote(&self.host));
        let _ = writeln!(s, "SSH_PORT={}", self.ssh_port);
        let _ = writeln!(s, "WEB_PORT={}", self.web_port);
        let _ = writeln!(s);
        let _ = writeln!(s, "if [ \"${{{IN_CONTAINER_ENV}:-0}}\" = \"1\" ]; then");
        let _ = writeln!(s, "    mkdir -p /run/sshd");
        let _ = writeln!(
            s,
            "    /usr/sbin/sshd 2>/dev/null || service ssh start 2>/dev/null || echo \"sshd could not be started\""
        );
        let _ = writeln!(s, "elif command -v python3 >/dev/null 2>&1; then");
        let _ = writeln!(s, "    mkdir -p {}", dirs::DATA_DIR);
        let _ = writeln!(
            s,
            "    python3 -m http.server \"$WEB_PORT\" --bind \"$HOST\" --directory {} >/dev/null 2>&1 &",
            dirs::DATA_DIR
        );
        let _ = writeln!(s, "fi");
        let _ = writeln!(s);
        let _ = writeln!(s, "echo \"{RULE}\"");
        let _ = writeln!(s, "echo \"Instance $NAME is ready\"");
        let _ = writeln!(s, "echo \"{RULE}\"");
        let _ = writeln!(s, "echo \"OS: $OS_NAME\"");
        let _ = writeln!(s, "echo \"User: $LOGIN_USER\"");
        let _ = writeln!(s, "echo \"SSH: ssh $LOGIN_USER@$HOST -p $SSH_PORT\"");
        let _ = writeln!(s, "echo \"Web: http://$HOST:$WEB_PORT\"");
        let _ = writeln!(s, "echo \"{RULE}\"");
        let _ = writeln!(s);
        let _ = writeln!(s, "while true; do");
        let _ = writeln!(s, "    sleep {}", self.heartbeat_secs);
        let _ = writeln!(s, "    echo \"[$(date)] Instance $NAME heartbeat\"");
        let _ = writeln!(s, "done");
        s
    }
}

// ============================================================================
// MANAGEMENT INTERFACE
// ============================================================================

/// Subcommands of the generated management script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManageCommand {
    Start,
    Stop,
    Restart,
    Status,
    Logs,
    Shell,
    Exec,
    Update,
    Backup,
    Info,
    Help,
}

impl ManageCommand {
    pub const ALL: [ManageCommand; 11] = [
        ManageCommand::Start,
        ManageCommand::Stop,
        ManageCommand::Restart,
        ManageCommand::Status,
        ManageCommand::Logs,
        ManageCommand::Shell,
        ManageCommand::Exec,
        ManageCommand::Update,
        ManageCommand::Backup,
        ManageCommand::Info,
        ManageCommand::Help,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ManageCommand::Start => "start",
            ManageCommand::Stop => "stop",
            ManageCommand::Restart => "restart",
            ManageCommand::Status => "status",
            ManageCommand::Logs => "logs",
            ManageCommand::Shell => "shell",
            ManageCommand::Exec => "exec",
            ManageCommand::Update => "update",
            ManageCommand::Backup => "backup",
            ManageCommand::Info => "info",
            ManageCommand::Help => "help",
        }
    }

    pub fn summary(&self) -> &'static str {
        match self {
            ManageCommand::Start => "Start the instance",
            ManageCommand::Stop => "Stop the instance",
            ManageCommand::Restart => "Restart the instance",
            ManageCommand::Status => "Show liveness and resource usage",
            ManageCommand::Logs => "Show recent output",
            ManageCommand::Shell => "Open an SSH session",
            ManageCommand::Exec => "Run a command inside the instance",
            ManageCommand::Update => "Upgrade installed packages",
            ManageCommand::Backup => "Export a filesystem snapshot",
            ManageCommand::Info => "Print the instance descriptor",
            ManageCommand::Help => "Show this help",
        }
    }

    /// Shell lines of the case arm, without the pattern and `;;`.
    fn body(&self, upgrade: &str) -> Vec<String> {
        let lines: &[&str] = match self {
            ManageCommand::Start => &[
                "echo \"Starting instance: $NAME\"",
                "if local_running; then",
                "    echo \"Already running as local process $(cat \"$PID_FILE\")\"",
                "elif $COMPOSE up -d; then",
                "    echo \"SSH: ssh $LOGIN_USER@$HOST -p $SSH_PORT\"",
                "else",
                "    echo \"Container runtime unavailable, starting local process\"",
                "    start_local",
                "fi",
            ],
            ManageCommand::Stop => &[
                "echo \"Stopping instance: $NAME\"",
                "if [ -f \"$PID_FILE\" ]; then",
                "    stop_local",
                "else",
                "    $COMPOSE down",
                "fi",
            ],
            ManageCommand::Restart => &[
                "echo \"Restarting instance: $NAME\"",
                "if [ -f \"$PID_FILE\" ]; then",
                "    stop_local",
                "    start_local",
                "else",
                "    $COMPOSE restart",
                "fi",
            ],
            ManageCommand::Status => &[
                "if local_running; then",
                "    echo \"Status: RUNNING (local process $(cat \"$PID_FILE\"))\"",
                "elif $COMPOSE ps 2>/dev/null | grep -q \"Up\"; then",
                "    echo \"Status: RUNNING\"",
                "    echo \"SSH port: $SSH_PORT\"",
                "    echo \"Web port: $WEB_PORT\"",
                "    $DOCKER stats \"$CONTAINER\" --no-stream 2>/dev/null || echo \"Stats not available\"",
                "else",
                "    echo \"Status: STOPPED\"",
                "fi",
            ],
            ManageCommand::Logs => &[
                "if [ -f \"$PID_FILE\" ]; then",
                "    tail -n 100 \"$LOG_FILE\"",
                "else",
                "    $COMPOSE logs --tail 100",
                "fi",
            ],
            ManageCommand::Shell => &[
                "ssh $SSH_OPTIONS \"$LOGIN_USER@$HOST\" -p \"$SSH_PORT\" \\",
                "    || echo \"SSH connection failed. Make sure the instance is running.\"",
            ],
            ManageCommand::Exec => &[
                "shift",
                "require_container exec",
                "$DOCKER exec -i \"$CONTAINER\" \"$@\"",
            ],
            ManageCommand::Update => &["require_container update"],
            ManageCommand::Backup => &[
                "mkdir -p \"$BACKUP_DIR\"",
                "STAMP=$(date +%Y%m%d-%H%M%S)",
                "if [ -f \"$PID_FILE\" ]; then",
                "    BACKUP_FILE=\"$BACKUP_DIR/backup-$STAMP.tar.gz\"",
                "    tar -czf \"$BACKUP_FILE\" -C \"$DIR\" data",
                "else",
                "    BACKUP_FILE=\"$BACKUP_DIR/backup-$STAMP.tar\"",
                "    $DOCKER export \"$CONTAINER\" > \"$BACKUP_FILE\"",
                "fi && echo \"Backup saved to: $BACKUP_FILE\"",
            ],
            ManageCommand::Info => &[
                "echo \"Name: $NAME\"",
                "echo \"ID: $INSTANCE_ID\"",
                "echo \"SSH: ssh $LOGIN_USER@$HOST -p $SSH_PORT\"",
                "echo \"Web: http://$HOST:$WEB_PORT\"",
                "echo \"Directory: $DIR\"",
                "[ -f \"$DIR/config.json\" ] && cat \"$DIR/config.json\"",
            ],
            ManageCommand::Help => &[],
        };

        let mut body: Vec<String> = lines.iter().map(|line| line.to_string()).collect();
        match self {
            ManageCommand::Update => {
                body.push("echo \"Updating instance: $NAME\"".to_string());
                body.push(format!(
                    "$DOCKER exec \"$CONTAINER\" sh -c {}",
                    sh_quote(upgrade)
                ));
            }
            ManageCommand::Help => {
                body.push("echo \"Usage: $0 <command>\"".to_string());
                for command in ManageCommand::ALL {
                    body.push(format!(
                        "echo \"  {:<8} {}\"",
                        command.name(),
                        command.summary()
                    ));
                }
            }
            _ => {}
        }
        body
    }
}

/// Generated `manage.sh`: one case arm per [`ManageCommand`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagementInterface {
    pub instance_id: String,
    pub display_name: String,
    pub instance_dir: PathBuf,
    pub container_name: String,
    pub username: String,
    pub host: String,
    pub ssh_port: u16,
    pub web_port: u16,
    pub upgrade_command: String,
    pub docker_program: String,
    pub compose_program: String,
}

impl ManagementInterface {
    pub fn render(&self) -> String {
        let dir = self.instance_dir.display().to_string();

        let mut s = String::new();
        let _ = writeln!(s, "#!/bin/bash");
        let _ = writeln!(s, "# Management interface for instance {}", one_line(&self.display_name));
        let _ = writeln!(s);
        let _ = writeln!(s, "INSTANCE_ID={}", sh_quote(&self.instance_id));
        let _ = writeln!(s, "NAME={}", sh_quote(&self.display_name));
        let _ = writeln!(s, "DIR={}", sh_quote(&dir));
        let _ = writeln!(s, "CONTAINER={}", sh_quote(&self.container_name));
        let _ = writeln!(s, "LOGIN_USER={}", sh_quote(&self.username));
        let _ = writeln!(s, "HOST={}", sh_quote(&self.host));
        let _ = writeln!(s, "SSH_PORT={}", self.ssh_port);
        let _ = writeln!(s, "WEB_PORT={}", self.web_port);
        let _ = writeln!(s, "SSH_OPTIONS={}", sh_quote(SSH_OPTIONS));
        let _ = writeln!(s, "DOCKER={}", sh_quote(&self.docker_program));
        let _ = writeln!(s, "COMPOSE={}", sh_quote(&self.compose_program));
        let _ = writeln!(s, "PID_FILE=\"$DIR/{}\"", filenames::PID_FILE);
        let _ = writeln!(
            s,
            "LOG_FILE=\"$DIR/{}/{}\"",
            dirs::LOGS_DIR,
            filenames::INSTANCE_LOG
        );
        let _ = writeln!(s, "BACKUP_DIR=\"$DIR/{}\"", dirs::BACKUPS_DIR);
        let _ = writeln!(s, "STARTUP=\"$DIR/{}\"", filenames::STARTUP);
        let _ = writeln!(s);
        s.push_str(LOCAL_FALLBACK);
        let _ = writeln!(s);
        let _ = writeln!(s, "cd \"$DIR\" || exit 1");
        let _ = writeln!(s);
        let _ = writeln!(s, "case \"$1\" in");
        for command in ManageCommand::ALL {
            let pattern = match command {
                ManageCommand::Help => "help|*".to_string(),
                other => other.name().to_string(),
            };
            let _ = writeln!(s, "    {pattern})");
            for line in command.body(&self.upgrade_command) {
                let _ = writeln!(s, "        {line}");
            }
            let _ = writeln!(s, "        ;;");
        }
        let _ = writeln!(s, "esac");
        s
    }
}

// ============================================================================
// SSH HELPER
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectScript {
    pub display_name: String,
    pub username: String,
    pub host: String,
    pub ssh_port: u16,
}

impl ConnectScript {
    pub fn render(&self) -> String {
        let mut s = String::new();
        let _ = writeln!(s, "#!/bin/bash");
        let _ = writeln!(s, "# SSH helper for instance {}", one_line(&self.display_name));
        let _ = writeln!(s);
        let _ = writeln!(s, "NAME={}", sh_quote(&self.display_name));
        let _ = writeln!(s, "echo \"{RULE}\"");
        let _ = writeln!(s, "echo \"Connecting to instance: $NAME\"");
        let _ = writeln!(s, "echo \"{RULE}\"");
        let _ = writeln!(
            s,
            "exec ssh {SSH_OPTIONS} -p {} {}@{} \"$@\"",
            self.ssh_port,
            sh_quote(&self.username),
            self.host
        );
        s
    }
}

/// Strip newlines from text placed in a script comment.
fn one_line(text: &str) -> String {
    text.replace(['\n', '\r'], " ")
}
