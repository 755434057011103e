//! 通过外部命令实现的导入工作流步骤
//!
//! 每个步骤对应一个可执行程序，参数通过命令行传入，结果以 JSON 输出到 stdout。
//! 退出码 130（SIGINT）视为操作员中断。取消令牌触发或 future 被丢弃时子进程会被杀掉。

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use media_scheduler_core::{
    config::StepsConfig,
    models::{
        ExtractOutput, ImportOutput, ImportRequest, PruneOutput, StepError, StepOptions,
        StepResult,
    },
    MediaItem, WorkflowSteps,
};

const INTERRUPTED_EXIT_CODE: i32 = 130;

#[derive(Debug, Deserialize)]
struct ResidueOutput {
    residue: bool,
}

#[derive(Debug, Deserialize)]
struct AnalyzeOutput {
    #[serde(default)]
    episodes: Vec<u32>,
}

pub struct CommandWorkflowSteps {
    config: StepsConfig,
}

impl CommandWorkflowSteps {
    pub fn new(config: StepsConfig) -> Self {
        Self { config }
    }

    async fn run_json<T: DeserializeOwned>(
        &self,
        program: &str,
        args: Vec<String>,
        cancel: CancellationToken,
    ) -> StepResult<T> {
        let mut cmd = Command::new(program);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.config.working_dir {
            cmd.current_dir(dir);
        }

        debug!("执行步骤命令: {} {:?}", program, args);
        let child = cmd
            .spawn()
            .map_err(|e| StepError::failed(format!("启动命令 {program} 失败: {e}")))?;

        let output = tokio::select! {
            result = child.wait_with_output() => {
                result.map_err(|e| StepError::failed(format!("等待命令 {program} 失败: {e}")))?
            }
            _ = cancel.cancelled() => {
                warn!("步骤命令 {} 被取消", program);
                return Err(StepError::failed(format!("命令 {program} 已取消")));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(match output.status.code() {
                Some(INTERRUPTED_EXIT_CODE) => StepError::Interrupted(stderr),
                Some(code) => StepError::failed(format!("命令 {program} 退出码 {code}: {stderr}")),
                None => StepError::failed(format!("命令 {program} 被信号终止: {stderr}")),
            });
        }

        serde_json::from_slice(&output.stdout)
            .map_err(|e| StepError::failed(format!("解析命令 {program} 的输出失败: {e}")))
    }
}

fn path_arg(path: &Path) -> String {
    path.display().to_string()
}

fn special_flag(args: &mut Vec<String>, options: StepOptions) {
    if options.special_episode_handling {
        args.push("--special-episodes".to_string());
    }
}

fn join_numbers(numbers: &BTreeSet<u32>) -> String {
    numbers
        .iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

#[async_trait]
impl WorkflowSteps for CommandWorkflowSteps {
    async fn extract(
        &self,
        item: &MediaItem,
        season: u32,
        cancel: CancellationToken,
    ) -> StepResult<ExtractOutput> {
        let mut args = vec![
            "--item-id".to_string(),
            item.id.clone(),
            "--title".to_string(),
            item.title.clone(),
            "--season".to_string(),
            season.to_string(),
        ];
        if let Some(url) = &item.source_url {
            args.push("--source-url".to_string());
            args.push(url.clone());
        }
        self.run_json(&self.config.extract_command, args, cancel).await
    }

    async fn prune_marked(
        &self,
        path: &Path,
        item: &MediaItem,
        season: u32,
        options: StepOptions,
        cancel: CancellationToken,
    ) -> StepResult<PruneOutput> {
        let completed = item.completed_episode_numbers(season);
        if completed.is_empty() {
            return Ok(PruneOutput {
                path: PathBuf::from(path),
                removed: 0,
            });
        }
        let mut args = vec![
            "--input".to_string(),
            path_arg(path),
            "--season".to_string(),
            season.to_string(),
            "--completed".to_string(),
            join_numbers(&completed),
        ];
        special_flag(&mut args, options);
        self.run_json(&self.config.prune_command, args, cancel).await
    }

    async fn check_residue(
        &self,
        path: &Path,
        title: &str,
        cancel: CancellationToken,
    ) -> StepResult<bool> {
        let args = vec![
            "--input".to_string(),
            path_arg(path),
            "--title".to_string(),
            title.to_string(),
        ];
        let output: ResidueOutput = self
            .run_json(&self.config.residue_command, args, cancel)
            .await?;
        Ok(output.residue)
    }

    async fn import(
        &self,
        item: &MediaItem,
        request: &ImportRequest,
        cancel: CancellationToken,
    ) -> StepResult<ImportOutput> {
        let mut args = vec![
            "--input".to_string(),
            path_arg(&request.path),
            "--item-id".to_string(),
            item.id.clone(),
            "--season".to_string(),
            request.season.to_string(),
            "--conflict-policy".to_string(),
            request.conflict_policy.as_str().to_string(),
        ];
        special_flag(&mut args, request.options);
        self.run_json(&self.config.import_command, args, cancel).await
    }

    async fn analyze_remaining(
        &self,
        path: &Path,
        cancel: CancellationToken,
    ) -> StepResult<BTreeSet<u32>> {
        let args = vec!["--input".to_string(), path_arg(path)];
        let output: AnalyzeOutput = self
            .run_json(&self.config.analyze_command, args, cancel)
            .await?;
        Ok(output.episodes.into_iter().collect())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;

    fn steps_with(command: &str) -> CommandWorkflowSteps {
        CommandWorkflowSteps::new(StepsConfig {
            extract_command: command.to_string(),
            prune_command: command.to_string(),
            residue_command: command.to_string(),
            import_command: command.to_string(),
            analyze_command: command.to_string(),
            working_dir: None,
        })
    }

    #[tokio::test]
    async fn test_missing_program_is_failure() {
        let steps = steps_with("/nonexistent/catalog-step");
        let err = steps
            .analyze_remaining(Path::new("/tmp/x.csv"), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, StepError::Failed(_)));
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_failure() {
        let steps = steps_with("false");
        let err = steps
            .check_residue(Path::new("/tmp/x.csv"), "标题", CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, StepError::Failed(_)));
    }

    #[tokio::test]
    async fn test_cancel_stops_command() {
        let steps = steps_with("sleep");
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let started = std::time::Instant::now();
        let result = steps
            .run_json::<AnalyzeOutput>("sleep", vec!["30".to_string()], cancel)
            .await;
        assert!(result.is_err());
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_json_output_is_parsed() {
        let steps = steps_with("echo");
        let output: AnalyzeOutput = steps
            .run_json(
                "echo",
                vec![r#"{"episodes":[3,1,2]}"#.to_string()],
                CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(output.episodes, vec![3, 1, 2]);
    }
}
