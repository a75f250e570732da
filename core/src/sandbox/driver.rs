//! Drives one sandbox container invocation through the Docker Engine API.
//!
//! The launch parameters (mounts, memory/CPU caps, `no-new-privileges`,
//! read-only rootfs, tmpfs scratch, network disabled) are normative; the
//! lifecycle shape — race the container wait against a deadline, force-kill
//! on timeout, always collect output, always clean up — mirrors a local
//! process driver generalized to a remote daemon call.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use bollard::container::{
    Config as ContainerConfig, CreateContainerOptions, LogsOptions, RemoveContainerOptions,
    StopContainerOptions, WaitContainerOptions,
};
use bollard::image::BuildImageOptions;
use bollard::models::{HostConfig, Mount, MountTypeEnum};
use bollard::Docker;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{CoreError, Result, SandboxErr};
use crate::model::{ExecutionResult, Workspace};
use crate::sandbox::policy::ResourceLimits;

#[derive(Debug, Clone)]
pub struct SandboxConfig {
    pub image: String,
    pub build_on_init: bool,
    pub build_context: std::path::PathBuf,
}

pub struct ContainerRuntimeDriver {
    docker: Docker,
    config: SandboxConfig,
}

impl ContainerRuntimeDriver {
    pub fn connect(config: SandboxConfig) -> Result<Self> {
        let docker =
            Docker::connect_with_local_defaults().map_err(SandboxErr::DaemonUnreachable)?;
        Ok(Self { docker, config })
    }

    /// Probes for the configured image, building it from `build_context`
    /// when absent and `build_on_init` is set; otherwise fails fast rather
    /// than launching a container against a missing image.
    pub async fn ensure_image(&self) -> Result<()> {
        if self.docker.inspect_image(&self.config.image).await.is_ok() {
            return Ok(());
        }
        if !self.config.build_on_init {
            return Err(SandboxErr::ImageMissing(self.config.image.clone()).into());
        }
        self.build_image().await
    }

    async fn build_image(&self) -> Result<()> {
        let options = BuildImageOptions {
            dockerfile: "Dockerfile".to_string(),
            t: self.config.image.clone(),
            rm: true,
            forcerm: true,
            ..Default::default()
        };

        let context_tar = tokio::task::spawn_blocking({
            let path = self.config.build_context.clone();
            move || tar_directory(&path)
        })
        .await??;

        let mut stream = self.docker.build_image(options, None, Some(context_tar.into()));
        while let Some(chunk) = stream.next().await {
            chunk.map_err(|source| SandboxErr::ImageBuild { image: self.config.image.clone(), source })?;
        }
        Ok(())
    }

    /// Runs `workspace`'s program to completion or until `deadline` elapses,
    /// always collecting whatever output exists and always removing the
    /// container, even on timeout or cancellation.
    pub async fn execute(
        &self,
        workspace: &Workspace,
        limits: &ResourceLimits,
        deadline: Duration,
        cancel: &CancellationToken,
    ) -> Result<ExecutionResult> {
        let execution_id = Uuid::new_v4().to_string()[..8].to_string();
        let container_name = format!("sandbox_{execution_id}");
        let start = Instant::now();

        tracing::info!(execution_id = %execution_id, image = %self.config.image, "starting sandbox execution");

        let create_result = self.create_container(workspace, limits, &container_name).await;
        let container_id = match create_result {
            Ok(id) => id,
            Err(err) => {
                tracing::warn!(execution_id = %execution_id, error = %err, "container creation failed");
                return Ok(ExecutionResult {
                    success: false,
                    stdout: String::new(),
                    stderr: err.to_string(),
                    outputs: Default::default(),
                    elapsed: start.elapsed(),
                    exit_code: -1,
                    error: Some(err.to_string()),
                    execution_id,
                });
            }
        };

        if let Err(err) = self.docker.start_container::<String>(&container_id, None).await {
            tracing::warn!(execution_id = %execution_id, error = %err, "container start failed");
            self.force_remove(&container_id).await;
            return Ok(ExecutionResult {
                success: false,
                stdout: String::new(),
                stderr: err.to_string(),
                outputs: Default::default(),
                elapsed: start.elapsed(),
                exit_code: -1,
                error: Some(err.to_string()),
                execution_id,
            });
        }

        let wait_outcome = tokio::select! {
            result = self.wait_container(&container_id) => Outcome::Exited(result),
            () = tokio::time::sleep(deadline) => Outcome::Timeout,
            () = cancel.cancelled() => Outcome::Cancelled,
        };

        let (success, exit_code, error) = match wait_outcome {
            Outcome::Exited(Ok(code)) => (code == 0, code, None),
            Outcome::Exited(Err(err)) => (false, -1, Some(err.to_string())),
            Outcome::Timeout => {
                self.stop_then_remove(&container_id).await;
                (false, -1, Some("timeout".to_string()))
            }
            Outcome::Cancelled => {
                self.stop_then_remove(&container_id).await;
                (false, -1, Some("cancelled".to_string()))
            }
        };

        let stdout = self.collect_logs(&container_id).await.unwrap_or_default();
        let outputs = crate::workspace::collect_outputs(workspace).await?;
        self.force_remove(&container_id).await;

        tracing::info!(
            execution_id = %execution_id,
            success,
            exit_code,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "sandbox execution finished"
        );

        Ok(ExecutionResult {
            success,
            stdout,
            stderr: String::new(),
            outputs,
            elapsed: start.elapsed(),
            exit_code,
            error,
            execution_id,
        })
    }

    async fn create_container(
        &self,
        workspace: &Workspace,
        limits: &ResourceLimits,
        container_name: &str,
    ) -> Result<String> {
        let mounts = vec![
            ro_bind_mount(&workspace.script_file, "/sandbox/script.py"),
            ro_bind_mount(&workspace.data_dir, "/sandbox/data"),
            rw_bind_mount(&workspace.outputs_dir, "/sandbox/outputs"),
        ];

        let mut tmpfs = HashMap::new();
        tmpfs.insert("/tmp".to_string(), format!("size={}", limits.tmpfs_size_bytes()));

        let host_config = HostConfig {
            mounts: Some(mounts),
            network_mode: Some("none".to_string()),
            memory: Some(limits.memory_bytes()),
            memory_swap: Some(limits.memory_bytes()),
            cpu_period: Some(ResourceLimits::cpu_period()),
            cpu_quota: Some(limits.cpu_quota()),
            security_opt: Some(vec!["no-new-privileges".to_string()]),
            readonly_rootfs: Some(true),
            tmpfs: Some(tmpfs),
            ..Default::default()
        };

        let config = ContainerConfig {
            image: Some(self.config.image.clone()),
            cmd: Some(vec!["python".to_string(), "-u".to_string(), "/sandbox/script.py".to_string()]),
            host_config: Some(host_config),
            ..Default::default()
        };

        let options = CreateContainerOptions { name: container_name.to_string(), platform: None };
        let response = self
            .docker
            .create_container(Some(options), config)
            .await
            .map_err(SandboxErr::Docker)?;
        Ok(response.id)
    }

    async fn wait_container(&self, container_id: &str) -> Result<i64> {
        let mut stream = self.docker.wait_container(container_id, None::<WaitContainerOptions<String>>);
        match stream.next().await {
            Some(Ok(response)) => Ok(response.status_code),
            Some(Err(err)) => Err(SandboxErr::Docker(err).into()),
            None => Err(CoreError::Sandbox(SandboxErr::NonZeroExit(-1))),
        }
    }

    async fn collect_logs(&self, container_id: &str) -> Result<String> {
        let options =
            LogsOptions::<String> { stdout: true, stderr: true, ..Default::default() };
        let mut stream = self.docker.logs(container_id, Some(options));
        let mut combined = String::new();
        while let Some(chunk) = stream.next().await {
            if let Ok(log) = chunk {
                combined.push_str(&log.to_string());
            }
        }
        Ok(combined)
    }

    async fn stop_then_remove(&self, container_id: &str) {
        let stop_options = StopContainerOptions { t: ResourceLimits::stop_grace_secs() };
        let _ = self.docker.stop_container(container_id, Some(stop_options)).await;
        self.force_remove(container_id).await;
    }

    async fn force_remove(&self, container_id: &str) {
        let options = RemoveContainerOptions { force: true, ..Default::default() };
        let _ = self.docker.remove_container(container_id, Some(options)).await;
    }
}

enum Outcome {
    Exited(Result<i64>),
    Timeout,
    Cancelled,
}

fn ro_bind_mount(host_path: &std::path::Path, target: &str) -> Mount {
    Mount {
        target: Some(target.to_string()),
        source: Some(host_path.to_string_lossy().into_owned()),
        typ: Some(MountTypeEnum::BIND),
        read_only: Some(true),
        ..Default::default()
    }
}

fn rw_bind_mount(host_path: &std::path::Path, target: &str) -> Mount {
    Mount {
        target: Some(target.to_string()),
        source: Some(host_path.to_string_lossy().into_owned()),
        typ: Some(MountTypeEnum::BIND),
        read_only: Some(false),
        ..Default::default()
    }
}

/// Packs a build context directory into an in-memory tar, the shape bollard
/// wants for `build_image`.
fn tar_directory(path: &std::path::Path) -> Result<Vec<u8>> {
    let mut builder = tar::Builder::new(Vec::new());
    builder.append_dir_all(".", path)?;
    builder.into_inner().map_err(|err| err.into())
}
