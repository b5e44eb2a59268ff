//! 编排器 + 工具注册表 + 沙箱 端到端测试（脚本化 Mock 模型，无网络）

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};
    use std::sync::Arc;

    use migrator::config::AppConfig;
    use migrator::core::{AgentBuilder, TurnState};
    use migrator::llm::{MockLlmClient, ResponseFragment};
    use migrator::react::ConversationOrchestrator;
    use serde_json::json;
    use tokio_util::sync::CancellationToken;

    fn workspace() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::TempDir::new().unwrap();
        let root = std::fs::canonicalize(dir.path()).unwrap();
        std::fs::write(root.join("go.mod"), "module example.com/shop\n\ngo 1.22\n").unwrap();
        std::fs::write(
            root.join("main.go"),
            "package main\n\nimport \"github.com/old/log\"\n\nfunc main() { log.Info(\"hi\") }\n",
        )
        .unwrap();
        (dir, root)
    }

    fn orchestrator(root: &Path, llm: Arc<MockLlmClient>) -> ConversationOrchestrator {
        let mut cfg = AppConfig::default();
        cfg.app.workspace_root = Some(root.to_path_buf());
        cfg.tools.package_manager.program = "echo".to_string();
        AgentBuilder::new(cfg).with_llm(llm).build().unwrap()
    }

    fn path(root: &Path, name: &str) -> String {
        root.join(name).display().to_string()
    }

    #[tokio::test]
    async fn test_migration_session_edits_workspace() {
        let (_dir, root) = workspace();
        let main_go = path(&root, "main.go");
        let summary = path(&root, "migration_summary.md");
        let llm = Arc::new(MockLlmClient::with_script(vec![
            vec![
                ResponseFragment::text("Let me look around."),
                ResponseFragment::tool_call(0, "call_base", "get_base_directory", json!({})),
                ResponseFragment::tool_call(1, "call_read", "read_file", json!({"file_path": main_go})),
            ],
            vec![
                ResponseFragment::tool_call(
                    0,
                    "call_patch",
                    "patch_file_lines",
                    json!({
                        "file_path": main_go,
                        "content_lines": ["import \"github.com/new/slog\""],
                        "line_start": 3,
                        "line_end": 4
                    }),
                ),
                ResponseFragment::tool_call(
                    1,
                    "call_summary",
                    "write_file",
                    json!({"file_path": summary, "content": "# Migration\n\nold/log -> new/slog\n"}),
                ),
            ],
            vec![ResponseFragment::text("Migration complete.")],
        ]));
        let mut orch = orchestrator(&root, llm.clone());

        let reply = orch
            .submit("Migrate old/log to new/slog", None, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(reply, "Migration complete.");
        assert_eq!(orch.state(), TurnState::AwaitingUserInput);

        let patched = std::fs::read_to_string(root.join("main.go")).unwrap();
        assert!(patched.contains("github.com/new/slog"));
        assert!(!patched.contains("github.com/old/log"));
        assert!(root.join("migration_summary.md").exists());

        // 第二次请求携带第一轮的结果
        let requests = llm.requests();
        assert_eq!(requests.len(), 3);
        let results: Vec<_> = requests[1]
            .messages
            .iter()
            .flat_map(|m| m.tool_results())
            .collect();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].call_id, "call_base");
        assert_eq!(results[0].result, Some(json!(root.display().to_string())));
        assert!(results[1].render().contains("github.com/old/log"));
        assert!(orch.log().pending_call_ids().is_empty());
    }

    #[tokio::test]
    async fn test_same_file_writes_apply_in_request_order() {
        let (_dir, root) = workspace();
        let target = path(&root, "notes.txt");
        let llm = Arc::new(MockLlmClient::with_script(vec![
            vec![
                ResponseFragment::tool_call(0, "w1", "write_file", json!({"file_path": target, "content": "first"})),
                ResponseFragment::tool_call(1, "w2", "write_file", json!({"file_path": target, "content": "second"})),
            ],
            vec![ResponseFragment::text("ok")],
        ]));
        let mut orch = orchestrator(&root, llm);
        orch.submit("write twice", None, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(std::fs::read_to_string(root.join("notes.txt")).unwrap(), "second");
    }

    #[tokio::test]
    async fn test_tool_failures_reach_the_model() {
        let (dir, root) = workspace();
        let outside = dir.path().parent().unwrap().join("escape.txt");
        let llm = Arc::new(MockLlmClient::with_script(vec![
            vec![
                ResponseFragment::tool_call(
                    0,
                    "bad_path",
                    "write_file",
                    json!({"file_path": outside.display().to_string(), "content": "x"}),
                ),
                ResponseFragment::tool_call(1, "bad_tool", "delete_everything", json!({})),
                ResponseFragment::tool_call(
                    2,
                    "bad_range",
                    "patch_file_lines",
                    json!({"file_path": path(&root, "go.mod"), "content_lines": [], "line_start": 40, "line_end": -1}),
                ),
            ],
            vec![ResponseFragment::text("Migration not possible.")],
        ]));
        let mut orch = orchestrator(&root, llm.clone());
        let reply = orch
            .submit("try", None, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(reply, "Migration not possible.");
        assert!(!outside.exists());
        assert_eq!(
            std::fs::read_to_string(root.join("go.mod")).unwrap(),
            "module example.com/shop\n\ngo 1.22\n"
        );

        let rendered: Vec<String> = llm.requests()[1]
            .messages
            .iter()
            .flat_map(|m| m.tool_results())
            .map(|r| r.render())
            .collect();
        assert!(rendered[0].starts_with("Error: Invalid path"));
        assert!(rendered[1].starts_with("Error: Unknown tool"));
        assert!(rendered[2].starts_with("Error: Invalid line range"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_package_tool_runs_in_module_directory() {
        let (_dir, root) = workspace();
        let llm = Arc::new(MockLlmClient::with_script(vec![
            vec![ResponseFragment::tool_call(
                0,
                "tidy",
                "go_mod_tidy",
                json!({"directory": root.display().to_string()}),
            )],
            vec![ResponseFragment::text("tidied")],
        ]));
        let mut orch = orchestrator(&root, llm.clone());
        orch.submit("tidy", None, &CancellationToken::new())
            .await
            .unwrap();
        let result = llm.requests()[1]
            .messages
            .iter()
            .flat_map(|m| m.tool_results())
            .next()
            .cloned()
            .unwrap();
        assert_eq!(result.render().trim(), "mod tidy");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_write_after_package_tool_in_same_round_wins() {
        use std::os::unix::fs::PermissionsExt;

        let (_dir, root) = workspace();
        let bin = tempfile::TempDir::new().unwrap();
        let fake_go = bin.path().join("go");
        std::fs::write(&fake_go, "#!/bin/sh\nsleep 0.5\necho 'module tidied' > go.mod\n").unwrap();
        std::fs::set_permissions(&fake_go, std::fs::Permissions::from_mode(0o755)).unwrap();

        let llm = Arc::new(MockLlmClient::with_script(vec![
            vec![
                ResponseFragment::tool_call(
                    0,
                    "tidy",
                    "go_mod_tidy",
                    json!({"directory": root.display().to_string()}),
                ),
                ResponseFragment::tool_call(
                    1,
                    "edit",
                    "write_file",
                    json!({"file_path": path(&root, "go.mod"), "content": "module edited-after-tidy"}),
                ),
            ],
            vec![ResponseFragment::text("done")],
        ]));
        let mut cfg = AppConfig::default();
        cfg.app.workspace_root = Some(root.clone());
        cfg.tools.package_manager.program = fake_go.display().to_string();
        let mut orch = AgentBuilder::new(cfg).with_llm(llm).build().unwrap();

        orch.submit("tidy then edit", None, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(
            std::fs::read_to_string(root.join("go.mod")).unwrap(),
            "module edited-after-tidy"
        );
    }

    #[tokio::test]
    async fn test_repeated_call_ids_are_renamed_before_execution() {
        let (_dir, root) = workspace();
        let a = path(&root, "a.txt");
        let b = path(&root, "b.txt");
        let c = path(&root, "c.txt");
        let llm = Arc::new(MockLlmClient::with_script(vec![
            vec![
                ResponseFragment::tool_call(0, "call_0", "write_file", json!({"file_path": a, "content": "A"})),
                ResponseFragment::tool_call(1, "call_0", "write_file", json!({"file_path": b, "content": "B"})),
            ],
            // 跨轮复用已经出现过的 id
            vec![ResponseFragment::tool_call(0, "call_0", "write_file", json!({"file_path": c, "content": "C"}))],
            vec![ResponseFragment::text("all written")],
        ]));
        let mut orch = orchestrator(&root, llm.clone());

        let reply = orch
            .submit("write files", None, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(reply, "all written");
        for (name, content) in [("a.txt", "A"), ("b.txt", "B"), ("c.txt", "C")] {
            assert_eq!(std::fs::read_to_string(root.join(name)).unwrap(), content);
        }

        let results: Vec<_> = llm.requests()[2]
            .messages
            .iter()
            .flat_map(|m| m.tool_results())
            .cloned()
            .collect();
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| r.error.is_none()));
        assert_eq!(results[0].call_id, "call_0");
        let mut ids: Vec<&str> = results.iter().map(|r| r.call_id.as_str()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 3);
        assert!(orch.log().pending_call_ids().is_empty());
    }
}
