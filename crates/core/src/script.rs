//! Diagnostic bash script rendering.
//!
//! The rendered script is passed to `bash -c` inside the batch container.
//! Every check goes through a `run_check` helper that records PASS, FAIL or
//! SKIP and never aborts the script, so one failing probe does not hide
//! the output of the others. The script exits non-zero when any check
//! failed, which marks the batch task as failed.

use crate::target::Target;
use crate::test_type::TestType;

/// Where the NFS export is mounted inside the container.
pub const NFS_MOUNT_POINT: &str = "/mnt/nfs-probe";

/// CVMFS repositories whose cache is checked by NFS probes.
pub const CVMFS_REPOSITORIES: [&str; 2] =
    ["data.galaxyproject.org", "singularity.galaxyproject.org"];

/// Name resolved through the DNS server under test.
const DNS_QUERY_NAME: &str = "www.google.com";

/// Per-command timeout in seconds.
const CHECK_TIMEOUT_SECS: u32 = 10;

/// One block of diagnostics in the rendered script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Environment,
    NetworkInterfaces,
    DnsResolution,
    DnsServerQuery,
    TcpReachability,
    HttpRequest,
    NfsMount,
    FilesystemCache,
}

impl Section {
    pub fn title(&self) -> &'static str {
        match self {
            Self::Environment => "Environment",
            Self::NetworkInterfaces => "Network interfaces",
            Self::DnsResolution => "DNS resolution",
            Self::DnsServerQuery => "DNS server query",
            Self::TcpReachability => "TCP reachability",
            Self::HttpRequest => "HTTP request",
            Self::NfsMount => "NFS RPC and mount",
            Self::FilesystemCache => "Filesystem cache",
        }
    }
}

/// Sections rendered for a test type, in order.
pub fn sections_for(test_type: TestType) -> &'static [Section] {
    use Section::*;
    match test_type {
        TestType::Nfs => &[
            Environment,
            NetworkInterfaces,
            DnsResolution,
            TcpReachability,
            NfsMount,
            FilesystemCache,
        ],
        TestType::Web => &[
            Environment,
            NetworkInterfaces,
            DnsResolution,
            TcpReachability,
            HttpRequest,
        ],
        TestType::ClusterDns | TestType::PublicDns => &[
            Environment,
            NetworkInterfaces,
            DnsResolution,
            DnsServerQuery,
            TcpReachability,
        ],
        // Netcat probes run `nc` directly as the container entrypoint.
        TestType::Netcat => &[],
    }
}

/// A rendered diagnostic script for one target.
#[derive(Debug, Clone)]
pub struct DiagnosticScript {
    test_type: TestType,
    target: Target,
}

impl DiagnosticScript {
    pub fn new(test_type: TestType, target: Target) -> Self {
        Self { test_type, target }
    }

    pub fn sections(&self) -> &'static [Section] {
        sections_for(self.test_type)
    }

    /// Render the complete script text.
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(8 * 1024);
        self.render_prelude(&mut out);
        for section in self.sections() {
            out.push_str(&format!("\nsection \"{}\"\n", section.title()));
            match section {
                Section::Environment => render_environment(&mut out),
                Section::NetworkInterfaces => render_network_interfaces(&mut out),
                Section::DnsResolution => render_dns_resolution(&mut out),
                Section::DnsServerQuery => render_dns_server_query(&mut out),
                Section::TcpReachability => render_tcp_reachability(&mut out),
                Section::HttpRequest => render_http_request(&mut out),
                Section::NfsMount => render_nfs_mount(&mut out),
                Section::FilesystemCache => render_filesystem_cache(&mut out),
            }
        }
        render_summary(&mut out);
        out
    }

    fn render_prelude(&self, out: &mut String) {
        out.push_str(&format!(
            r#"#!/bin/bash
set -u

TEST_TYPE='{test_type}'
TARGET_HOST='{host}'
TARGET_PORT='{port}'
CHECK_TIMEOUT={timeout}
PASSED=0
FAILED=0
SKIPPED=0

section() {{
    echo
    echo "=================================================="
    echo "== $1"
    echo "=================================================="
}}

have() {{
    command -v "$1" >/dev/null 2>&1
}}

run_check() {{
    local name="$1"
    shift
    echo
    echo "--- CHECK: $name"
    echo "+ $*"
    if timeout "$CHECK_TIMEOUT" "$@"; then
        echo "--- PASS: $name"
        PASSED=$((PASSED + 1))
    else
        echo "--- FAIL: $name (exit $?)"
        FAILED=$((FAILED + 1))
    fi
}}

skip_check() {{
    echo
    echo "--- SKIP: $1 ($2)"
    SKIPPED=$((SKIPPED + 1))
}}

echo "Network probe: $TEST_TYPE -> $TARGET_HOST:$TARGET_PORT"
echo "Started: $(date -u +%Y-%m-%dT%H:%M:%SZ)"
"#,
            test_type = self.test_type,
            host = self.target.host(),
            port = self.target.port(),
            timeout = CHECK_TIMEOUT_SECS,
        ));
    }
}

fn render_environment(out: &mut String) {
    out.push_str(
        r#"echo "Hostname: $(hostname 2>/dev/null || cat /etc/hostname)"
uname -a
if [ -r /etc/os-release ]; then
    . /etc/os-release
    echo "OS: ${PRETTY_NAME:-unknown}"
fi
echo "Container user: $(id)"
"#,
    );
}

fn render_network_interfaces(out: &mut String) {
    out.push_str(
        r#"if have ip; then
    ip -brief address || ip address
    ip route
else
    cat /proc/net/dev
    cat /proc/net/route
fi
echo "--- /etc/resolv.conf"
cat /etc/resolv.conf
"#,
    );
}

fn render_dns_resolution(out: &mut String) {
    out.push_str(
        r#"if echo "$TARGET_HOST" | grep -Eq '^[0-9.]+$|:'; then
    skip_check "resolve $TARGET_HOST" "target is an IP address"
else
    run_check "resolve $TARGET_HOST (getent)" getent hosts "$TARGET_HOST"
fi
run_check "resolve metadata.google.internal" getent hosts metadata.google.internal
"#,
    );
}

fn render_dns_server_query(out: &mut String) {
    out.push_str(&format!(
        r#"if have dig; then
    run_check "dig @$TARGET_HOST {name}" dig +time=3 +tries=2 -p "$TARGET_PORT" "@$TARGET_HOST" {name}
elif have nslookup; then
    run_check "nslookup {name} $TARGET_HOST" nslookup -port="$TARGET_PORT" {name} "$TARGET_HOST"
else
    skip_check "query $TARGET_HOST" "neither dig nor nslookup installed"
fi
if have nc; then
    run_check "udp $TARGET_HOST:$TARGET_PORT" nc -z -u -v -w 5 "$TARGET_HOST" "$TARGET_PORT"
else
    skip_check "udp $TARGET_HOST:$TARGET_PORT" "nc not installed"
fi
"#,
        name = DNS_QUERY_NAME,
    ));
}

fn render_tcp_reachability(out: &mut String) {
    out.push_str(
        r#"if have nc; then
    run_check "tcp $TARGET_HOST:$TARGET_PORT (nc)" nc -z -v -w 5 "$TARGET_HOST" "$TARGET_PORT"
else
    run_check "tcp $TARGET_HOST:$TARGET_PORT (/dev/tcp)" bash -c "exec 3<>/dev/tcp/$TARGET_HOST/$TARGET_PORT"
fi
"#,
    );
}

fn render_http_request(out: &mut String) {
    out.push_str(
        r#"if have curl; then
    run_check "http://$TARGET_HOST:$TARGET_PORT/" curl -sS -o /dev/null -w "HTTP %{http_code} in %{time_total}s\n" --max-time 10 "http://$TARGET_HOST:$TARGET_PORT/"
elif have wget; then
    run_check "http://$TARGET_HOST:$TARGET_PORT/" wget -q -O /dev/null -T 10 "http://$TARGET_HOST:$TARGET_PORT/"
else
    skip_check "http://$TARGET_HOST:$TARGET_PORT/" "neither curl nor wget installed"
fi
"#,
    );
}

fn render_nfs_mount(out: &mut String) {
    out.push_str(&format!(
        r#"if have rpcinfo; then
    run_check "rpcinfo $TARGET_HOST" rpcinfo -p "$TARGET_HOST"
else
    skip_check "rpcinfo $TARGET_HOST" "rpcinfo not installed"
fi
if have showmount; then
    run_check "showmount $TARGET_HOST" showmount -e "$TARGET_HOST"
else
    skip_check "showmount $TARGET_HOST" "showmount not installed"
fi
NFS_MOUNT_POINT='{mount_point}'
mkdir -p "$NFS_MOUNT_POINT"
NFS_EXPORT="$(showmount -e "$TARGET_HOST" 2>/dev/null | awk 'NR==2 {{print $1}}')"
NFS_EXPORT="${{NFS_EXPORT:-/}}"
echo "Export under test: $NFS_EXPORT"
if mount -t nfs -o vers=3,port="$TARGET_PORT",nolock,soft,timeo=50 "$TARGET_HOST:$NFS_EXPORT" "$NFS_MOUNT_POINT" 2>/dev/null \
    || mount -t nfs4 -o port="$TARGET_PORT",soft,timeo=50 "$TARGET_HOST:$NFS_EXPORT" "$NFS_MOUNT_POINT"; then
    echo "--- PASS: mount $TARGET_HOST:$NFS_EXPORT"
    PASSED=$((PASSED + 1))
    run_check "list $NFS_MOUNT_POINT" ls -la "$NFS_MOUNT_POINT"
    run_check "df $NFS_MOUNT_POINT" df -h "$NFS_MOUNT_POINT"
    umount "$NFS_MOUNT_POINT" || umount -l "$NFS_MOUNT_POINT"
else
    echo "--- FAIL: mount $TARGET_HOST:$NFS_EXPORT"
    FAILED=$((FAILED + 1))
fi
"#,
        mount_point = NFS_MOUNT_POINT,
    ));
}

fn render_filesystem_cache(out: &mut String) {
    out.push_str("if [ -d /cvmfs ]; then\n");
    for repo in CVMFS_REPOSITORIES {
        out.push_str(&format!(
            "    run_check \"list /cvmfs/{repo}\" ls /cvmfs/{repo}\n"
        ));
    }
    out.push_str(
        r#"    if have cvmfs_config; then
        run_check "cvmfs_config probe" cvmfs_config probe
    else
        skip_check "cvmfs_config probe" "cvmfs_config not installed"
    fi
else
    skip_check "filesystem cache" "/cvmfs not present in container"
fi
"#,
    );
}

fn render_summary(out: &mut String) {
    out.push_str(
        r#"
section "Summary"
echo "Finished: $(date -u +%Y-%m-%dT%H:%M:%SZ)"
echo "Passed: $PASSED  Failed: $FAILED  Skipped: $SKIPPED"
if [ "$FAILED" -gt 0 ]; then
    exit 1
fi
exit 0
"#,
    );
}

#[cfg(test)]
mod tests {
    use std::process::Command;

    use super::*;

    fn script(test_type: TestType, host: &str) -> String {
        let target = Target::new(host, test_type.default_port()).expect("valid target");
        DiagnosticScript::new(test_type, target).render()
    }

    #[test]
    fn prelude_defines_target_variables() {
        let text = script(TestType::Nfs, "10.0.0.5");
        assert!(text.starts_with("#!/bin/bash\n"));
        assert!(text.contains("TEST_TYPE='nfs'"));
        assert!(text.contains("TARGET_HOST='10.0.0.5'"));
        assert!(text.contains("TARGET_PORT='2049'"));
        assert!(text.contains("run_check() {"));
    }

    #[test]
    fn nfs_script_mounts_and_checks_cache() {
        let text = script(TestType::Nfs, "10.0.0.5");
        assert!(text.contains("section \"NFS RPC and mount\""));
        assert!(text.contains("showmount -e \"$TARGET_HOST\""));
        assert!(text.contains("NFS_MOUNT_POINT='/mnt/nfs-probe'"));
        assert!(text.contains("/cvmfs/data.galaxyproject.org"));
        assert!(!text.contains("section \"HTTP request\""));
    }

    #[test]
    fn web_script_issues_http_request() {
        let text = script(TestType::Web, "galaxy.example.org");
        assert!(text.contains("TARGET_PORT='80'"));
        assert!(text.contains("section \"HTTP request\""));
        assert!(!text.contains("section \"NFS RPC and mount\""));
    }

    #[test]
    fn dns_scripts_query_the_server() {
        for test_type in [TestType::ClusterDns, TestType::PublicDns] {
            let text = script(test_type, "10.96.0.10");
            assert!(text.contains("section \"DNS server query\""));
            assert!(text.contains("TARGET_PORT='53'"));
            assert!(text.contains("www.google.com"));
        }
    }

    #[test]
    fn every_script_ends_with_summary() {
        for test_type in TestType::ALL {
            let text = script(test_type, "10.0.0.5");
            assert!(text.contains("section \"Summary\""));
            assert!(text.trim_end().ends_with("exit 0"));
        }
    }

    #[test]
    fn every_script_is_valid_bash() {
        for test_type in TestType::ALL {
            let text = script(test_type, "10.0.0.5");
            let output = Command::new("bash")
                .args(["-n", "-c", &text])
                .output()
                .expect("bash available");
            assert!(
                output.status.success(),
                "{test_type} script does not parse: {}",
                String::from_utf8_lossy(&output.stderr)
            );
        }
    }

    #[test]
    fn script_exits_non_zero_when_a_check_fails() {
        let target = Target::new("127.0.0.1", 1).expect("valid target");
        let text = DiagnosticScript::new(TestType::PublicDns, target).render();

        let output = Command::new("bash")
            .args(["-c", &text])
            .output()
            .expect("bash available");
        let stdout = String::from_utf8_lossy(&output.stdout);

        assert_eq!(output.status.code(), Some(1), "stdout:\n{stdout}");
        let failed: u32 = stdout
            .lines()
            .find_map(|line| line.split("Failed: ").nth(1))
            .and_then(|rest| rest.split_whitespace().next())
            .and_then(|n| n.parse().ok())
            .expect("summary line with failure count");
        assert!(failed > 0, "stdout:\n{stdout}");
    }

    /// Each `if have TOOL; then ... fi` block in `text`, keyed by tool.
    fn have_blocks(text: &str) -> Vec<(String, String)> {
        let lines: Vec<&str> = text.lines().collect();
        let mut blocks = Vec::new();
        for (i, line) in lines.iter().enumerate() {
            let trimmed = line.trim_start();
            let Some(rest) = trimmed.strip_prefix("if have ") else {
                continue;
            };
            let tool = rest.split(';').next().unwrap_or_default().to_string();
            let indent = &line[..line.len() - trimmed.len()];
            let closing = format!("{indent}fi");
            let end = lines[i..]
                .iter()
                .position(|l| *l == closing)
                .expect("closing fi");
            blocks.push((tool, lines[i..i + end].join("\n")));
        }
        blocks
    }

    #[test]
    fn every_tool_check_has_an_else_branch() {
        for test_type in TestType::ALL {
            let text = script(test_type, "10.0.0.5");
            for (tool, block) in have_blocks(&text) {
                assert!(
                    block.lines().any(|l| matches!(l.trim(), "else") || l.trim().starts_with("elif ")),
                    "{test_type}: `have {tool}` block has no fallback:\n{block}"
                );
            }
        }
    }

    #[test]
    fn missing_optional_tools_are_skipped() {
        for test_type in TestType::ALL {
            let text = script(test_type, "10.0.0.5");
            for (tool, block) in have_blocks(&text) {
                // `ip` falls back to /proc, and the TCP check to /dev/tcp.
                if tool == "ip" || block.contains("/dev/tcp") {
                    continue;
                }
                assert!(
                    block.contains("skip_check"),
                    "{test_type}: missing `{tool}` is not reported as SKIP:\n{block}"
                );
            }
        }
    }

    #[test]
    fn dns_udp_and_cvmfs_checks_are_skippable() {
        let dns = script(TestType::ClusterDns, "10.96.0.10");
        assert!(dns.contains("skip_check \"udp $TARGET_HOST:$TARGET_PORT\" \"nc not installed\""));

        let nfs = script(TestType::Nfs, "10.0.0.5");
        assert!(nfs.contains("skip_check \"cvmfs_config probe\" \"cvmfs_config not installed\""));
    }

    #[test]
    fn rendering_is_deterministic() {
        assert_eq!(
            script(TestType::Web, "10.0.0.5"),
            script(TestType::Web, "10.0.0.5")
        );
    }

    #[test]
    fn netcat_has_no_sections() {
        assert!(sections_for(TestType::Netcat).is_empty());
    }
}
