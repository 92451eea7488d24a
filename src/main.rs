// ==========================================
// 仓储质检核心 - 命令行入口
// ==========================================
// 用法:
//   warehouse-qc [--db PATH] audit [--warehouse ID] [--fix]
//   warehouse-qc [--db PATH] departures [--warehouse ID]
// 数据库路径: --db > WAREHOUSE_QC_DB > 用户数据目录
// 输出: stdout 为 JSON，日志走 stderr
// ==========================================

use anyhow::{anyhow, bail, Context, Result};
use std::path::PathBuf;
use warehouse_qc::config::ConfigScope;
use warehouse_qc::{logging, AuditScope, WarehouseApi, APP_NAME, DB_PATH_ENV, VERSION};

#[derive(Debug)]
enum Command {
    Audit { warehouse: Option<String>, fix: bool },
    Departures { warehouse: Option<String> },
}

#[derive(Debug)]
struct CliArgs {
    db_path: Option<String>,
    command: Command,
}

fn usage() -> String {
    format!(
        "{} {}\n\n用法:\n  warehouse-qc [--db PATH] audit [--warehouse ID] [--fix]\n  warehouse-qc [--db PATH] departures [--warehouse ID]",
        APP_NAME, VERSION
    )
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<CliArgs> {
    let mut db_path = None;
    let mut warehouse = None;
    let mut fix = false;
    let mut command_name: Option<String> = None;

    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--db" => db_path = Some(args.next().ok_or_else(|| anyhow!("--db 缺少路径参数"))?),
            "--warehouse" => {
                warehouse = Some(args.next().ok_or_else(|| anyhow!("--warehouse 缺少仓库ID"))?)
            }
            "--fix" => fix = true,
            "-h" | "--help" => bail!(usage()),
            other if other.starts_with("--") => bail!("未知参数: {}\n\n{}", other, usage()),
            other => {
                if command_name.is_some() {
                    bail!("多余的参数: {}\n\n{}", other, usage());
                }
                command_name = Some(other.to_string());
            }
        }
    }

    let command = match command_name.as_deref() {
        Some("audit") => Command::Audit { warehouse, fix },
        Some("departures") => {
            if fix {
                bail!("departures 不支持 --fix");
            }
            Command::Departures { warehouse }
        }
        Some(other) => bail!("未知命令: {}\n\n{}", other, usage()),
        None => bail!(usage()),
    };

    Ok(CliArgs { db_path, command })
}

/// 数据库路径: 参数 > 环境变量 > 用户数据目录
fn resolve_db_path(cli: Option<String>) -> String {
    if let Some(path) = cli.map(|p| p.trim().to_string()).filter(|p| !p.is_empty()) {
        return path;
    }

    if let Ok(path) = std::env::var(DB_PATH_ENV) {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let mut path = PathBuf::from("./warehouse_qc.db");
    if let Some(data_dir) = dirs::data_dir() {
        let dir = data_dir.join("warehouse-qc");
        if std::fs::create_dir_all(&dir).is_ok() {
            path = dir.join("warehouse_qc.db");
        }
    }
    path.to_string_lossy().to_string()
}

fn main() -> Result<()> {
    logging::init();

    let args = parse_args(std::env::args().skip(1))?;
    let db_path = resolve_db_path(args.db_path);
    tracing::info!(db_path = %db_path, "使用数据库");

    let output = match args.command {
        Command::Audit { warehouse, fix } => {
            let (scope, config_scope) = match warehouse {
                Some(id) => (AuditScope::Warehouse(id.clone()), ConfigScope::warehouse(&id)),
                None => (AuditScope::All, ConfigScope::Global),
            };
            let api = WarehouseApi::open_scoped(&db_path, &config_scope)
                .with_context(|| format!("无法打开数据库: {}", db_path))?;
            let report = api.audit(scope, fix)?;
            serde_json::to_string_pretty(&report)?
        }
        Command::Departures { warehouse } => {
            let api = WarehouseApi::open(&db_path)
                .with_context(|| format!("无法打开数据库: {}", db_path))?;
            let records = api.available_for_departure(warehouse.as_deref())?;
            serde_json::to_string_pretty(&records)?
        }
    };

    println!("{}", output);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_audit_with_fix() {
        let parsed = parse_args(args(&["--db", "x.db", "audit", "--warehouse", "WH1", "--fix"])).unwrap();
        assert_eq!(parsed.db_path.as_deref(), Some("x.db"));
        match parsed.command {
            Command::Audit { warehouse, fix } => {
                assert_eq!(warehouse.as_deref(), Some("WH1"));
                assert!(fix);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_rejects_unknown() {
        assert!(parse_args(args(&["ship"])).is_err());
        assert!(parse_args(args(&["departures", "--fix"])).is_err());
        assert!(parse_args(args(&[])).is_err());
    }

    #[test]
    fn test_cli_path_wins() {
        assert_eq!(resolve_db_path(Some("a.db".to_string())), "a.db");
    }
}
