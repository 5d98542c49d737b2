//! Container runtime capability
//!
//! The backup and restore engines never shell out directly; they talk to a
//! [`ContainerRuntime`]. [`DockerCli`] drives the `docker` binary through
//! [`Cmd`](super::command::Cmd).

use std::path::Path;

use crate::error::{HostkeepError, HostkeepResult};

use super::command::Cmd;

/// Operations the engines need from a container runtime
pub trait ContainerRuntime {
    /// Names of all volumes
    fn list_volumes(&self) -> HostkeepResult<Vec<String>>;

    /// Names of running containers
    fn running_containers(&self) -> HostkeepResult<Vec<String>>;

    /// Declared environment of a container as `(key, value)` pairs
    fn container_env(&self, container: &str) -> HostkeepResult<Vec<(String, String)>>;

    /// Write the contents of `volume` as a gzip tarball at `dest`
    fn export_volume(&self, volume: &str, dest: &Path) -> HostkeepResult<()>;

    /// Replace the contents of `volume` (created if missing) from a tarball
    fn import_volume(&self, volume: &str, src: &Path) -> HostkeepResult<()>;

    /// Run `command` inside `container`, streaming stdout into `dest`
    fn exec_to_file(&self, container: &str, command: &[String], dest: &Path)
        -> HostkeepResult<()>;

    /// Run `command` inside `container` with `src` on stdin
    fn exec_from_file(&self, container: &str, command: &[String], src: &Path)
        -> HostkeepResult<()>;

    /// Containers (running or not) that mount `volume`
    fn containers_using_volume(&self, volume: &str) -> HostkeepResult<Vec<String>>;

    fn restart(&self, container: &str) -> HostkeepResult<()>;
}

/// `docker` CLI implementation
#[derive(Debug, Clone)]
pub struct DockerCli {
    binary: String,
    helper_image: String,
}

impl DockerCli {
    pub fn new(helper_image: impl Into<String>) -> Self {
        Self {
            binary: "docker".to_string(),
            helper_image: helper_image.into(),
        }
    }

    /// Use a docker-compatible binary such as `podman`
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    fn cmd(&self) -> Cmd {
        Cmd::new(&self.binary)
    }

    fn lines(&self, cmd: Cmd) -> HostkeepResult<Vec<String>> {
        Ok(cmd
            .run()?
            .stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }
}

fn split_archive_path(path: &Path) -> HostkeepResult<(String, String)> {
    let dir = path
        .parent()
        .ok_or_else(|| HostkeepError::Validation(format!("{} has no parent", path.display())))?;
    let dir = std::fs::canonicalize(dir)?;
    let file = path
        .file_name()
        .ok_or_else(|| HostkeepError::Validation(format!("{} has no file name", path.display())))?;
    Ok((
        dir.to_string_lossy().into_owned(),
        file.to_string_lossy().into_owned(),
    ))
}

impl ContainerRuntime for DockerCli {
    fn list_volumes(&self) -> HostkeepResult<Vec<String>> {
        self.lines(self.cmd().args(["volume", "ls", "--format", "{{.Name}}"]))
    }

    fn running_containers(&self) -> HostkeepResult<Vec<String>> {
        self.lines(self.cmd().args(["ps", "--format", "{{.Names}}"]))
    }

    fn container_env(&self, container: &str) -> HostkeepResult<Vec<(String, String)>> {
        let lines = self.lines(self.cmd().args([
            "inspect",
            "--format",
            "{{range .Config.Env}}{{println .}}{{end}}",
            container,
        ]))?;
        Ok(lines
            .iter()
            .filter_map(|l| l.split_once('='))
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect())
    }

    fn export_volume(&self, volume: &str, dest: &Path) -> HostkeepResult<()> {
        // Fails when the volume was removed or detached.
        self.cmd().args(["volume", "inspect", volume]).run()?;

        let (dir, file) = split_archive_path(dest)?;
        self.cmd()
            .args(["run", "--rm"])
            .arg("-v")
            .arg(format!("{}:/source:ro", volume))
            .arg("-v")
            .arg(format!("{}:/backup", dir))
            .arg(&self.helper_image)
            .args(["tar", "czf"])
            .arg(format!("/backup/{}", file))
            .args(["-C", "/source", "."])
            .run()?;
        Ok(())
    }

    fn import_volume(&self, volume: &str, src: &Path) -> HostkeepResult<()> {
        self.cmd().args(["volume", "create", volume]).run()?;

        let (dir, file) = split_archive_path(src)?;
        self.cmd()
            .args(["run", "--rm"])
            .arg("-v")
            .arg(format!("{}:/target", volume))
            .arg("-v")
            .arg(format!("{}:/backup:ro", dir))
            .arg(&self.helper_image)
            .args(["sh", "-c"])
            .arg(format!(
                "find /target -mindepth 1 -delete && tar xzf /backup/{} -C /target",
                file
            ))
            .run()?;
        Ok(())
    }

    fn exec_to_file(
        &self,
        container: &str,
        command: &[String],
        dest: &Path,
    ) -> HostkeepResult<()> {
        self.cmd()
            .arg("exec")
            .arg(container)
            .args(command)
            .stdout_to(dest)
            .run()?;
        Ok(())
    }

    fn exec_from_file(
        &self,
        container: &str,
        command: &[String],
        src: &Path,
    ) -> HostkeepResult<()> {
        self.cmd()
            .args(["exec", "-i"])
            .arg(container)
            .args(command)
            .stdin_from(src)
            .run()?;
        Ok(())
    }

    fn containers_using_volume(&self, volume: &str) -> HostkeepResult<Vec<String>> {
        let filter = format!("volume={}", volume);
        self.lines(self.cmd().args([
            "ps",
            "-a",
            "--filter",
            filter.as_str(),
            "--format",
            "{{.Names}}",
        ]))
    }

    fn restart(&self, container: &str) -> HostkeepResult<()> {
        self.cmd().args(["restart", container]).run()?;
        Ok(())
    }
}
