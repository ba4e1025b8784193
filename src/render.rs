//! Rendered host definitions: the systemd unit and the proxy vhost.
//!
//! Both files are derived from the manifest every run, never copied from
//! templates on disk, so the desired content is always reproducible from
//! configuration alone.

use std::fmt::Write;

use crate::config::Manifest;

/// Log variables every access record must carry.
///
/// This is the observability contract of the edge: request identity,
/// response outcome, and upstream timing/cache visibility. Renderings may
/// change quoting or order, but dropping a field breaks operators who debug
/// latency and cache behavior from these logs.
pub const ACCESS_LOG_FIELDS: &[&str] = &[
    "$remote_addr",
    "$remote_user",
    "$time_local",
    "$request",
    "$status",
    "$body_bytes_sent",
    "$http_referer",
    "$http_user_agent",
    "$request_time",
    "$upstream_response_time",
    "$upstream_addr",
    "$upstream_status",
    "$upstream_cache_status",
    "$pipe",
];

/// Render the vhost definition: one public listener, one local upstream.
pub fn vhost(manifest: &Manifest) -> String {
    let name = &manifest.service.name;
    let mut out = String::new();

    // log_format lives at http scope; site files are included there.
    let _ = writeln!(out, "log_format {name}_timed");
    let _ = writeln!(out, "    '$remote_addr - $remote_user [$time_local] '");
    let _ = writeln!(out, "    '\"$request\" $status $body_bytes_sent '");
    let _ = writeln!(out, "    '\"$http_referer\" \"$http_user_agent\" '");
    let _ = writeln!(out, "    'rt=$request_time urt=$upstream_response_time '");
    let _ = writeln!(
        out,
        "    'ua=$upstream_addr us=$upstream_status ucs=$upstream_cache_status pipe=$pipe';"
    );
    let _ = writeln!(out);
    let _ = writeln!(out, "server {{");
    let _ = writeln!(out, "    listen {};", manifest.host.listen_port);
    let _ = writeln!(out, "    server_name {};", manifest.service.server_name);
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "    access_log {}/{name}.access.log {name}_timed;",
        manifest.host.log_dir
    );
    let _ = writeln!(out);
    let _ = writeln!(out, "    root {};", manifest.web_root().display());
    let _ = writeln!(out, "    index index.html;");
    let _ = writeln!(out);
    let _ = writeln!(out, "    location / {{");
    let _ = writeln!(out, "        try_files $uri $uri/ =404;");
    let _ = writeln!(out, "    }}");
    let _ = writeln!(out);
    let _ = writeln!(out, "    location /{name} {{");
    let _ = writeln!(
        out,
        "        proxy_pass http://127.0.0.1:{};",
        manifest.service.upstream_port
    );
    let _ = writeln!(out, "        proxy_set_header Host $host;");
    let _ = writeln!(out, "        proxy_set_header X-Real-IP $remote_addr;");
    let _ = writeln!(
        out,
        "        proxy_set_header X-Forwarded-For $proxy_add_x_forwarded_for;"
    );
    let _ = writeln!(out, "    }}");
    let _ = writeln!(out, "}}");

    debug_assert!(
        ACCESS_LOG_FIELDS.iter().all(|field| out.contains(field)),
        "rendered vhost dropped an access-log field"
    );

    out
}

/// Render the service's process-supervision unit.
pub fn unit(manifest: &Manifest) -> String {
    let name = &manifest.service.name;
    let install_root = manifest.install_root();
    let mut out = String::new();

    let _ = writeln!(out, "[Unit]");
    let _ = writeln!(out, "Description={name} service");
    let _ = writeln!(out, "After=network.target");
    let _ = writeln!(out);
    let _ = writeln!(out, "[Service]");
    let _ = writeln!(out, "Type=simple");
    let _ = writeln!(out, "User=www-data");
    let _ = writeln!(out, "WorkingDirectory={}", install_root.display());
    let _ = writeln!(out, "EnvironmentFile={}/.env", install_root.display());
    let _ = writeln!(out, "ExecStart={}/{name}", install_root.display());
    let _ = writeln!(out, "Restart=on-failure");
    let _ = writeln!(out);
    let _ = writeln!(out, "[Install]");
    let _ = writeln!(out, "WantedBy=multi-user.target");

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest() -> Manifest {
        toml::from_str(
            r#"
[service]
name = "oration"
server_name = "blog.example.net"
"#,
        )
        .unwrap()
    }

    #[test]
    fn vhost_carries_every_access_log_field() {
        let rendered = vhost(&manifest());
        for field in ACCESS_LOG_FIELDS {
            assert!(
                rendered.contains(field),
                "access log is missing {field}"
            );
        }
    }

    #[test]
    fn vhost_has_exactly_one_upstream() {
        let rendered = vhost(&manifest());
        assert_eq!(rendered.matches("proxy_pass").count(), 1);
        assert!(rendered.contains("proxy_pass http://127.0.0.1:8000;"));
    }

    #[test]
    fn vhost_binds_the_public_listener() {
        let rendered = vhost(&manifest());
        assert!(rendered.contains("listen 80;"));
        assert!(rendered.contains("server_name blog.example.net;"));
        assert_eq!(rendered.matches("server {").count(), 1);
    }

    #[test]
    fn unit_runs_the_installed_executable() {
        let rendered = unit(&manifest());
        assert!(rendered.contains("ExecStart=/srv/oration/oration"));
        assert!(rendered.contains("EnvironmentFile=/srv/oration/.env"));
        assert!(rendered.contains("WantedBy=multi-user.target"));
    }
}
