use crate::backend;
use colored::Colorize;
use fleetstack_core::{Unit, UnitStatus, sort_units};

fn colored_state(state: UnitStatus) -> colored::ColoredString {
    let text = state.to_string();
    match state {
        UnitStatus::Started => text.green(),
        UnitStatus::Error | UnitStatus::Down => text.red(),
        _ => text.yellow(),
    }
}

/// 表示対象のユニットを絞り込み、エラーのものから順に並べる
pub fn select_units(mut units: Vec<Unit>, app: Option<&str>) -> Vec<Unit> {
    if let Some(app) = app {
        units.retain(|u| u.app_name == app);
    }
    // 同じ状態の中ではユニット名順
    units.sort_by(|a, b| a.name.cmp(&b.name));
    sort_units(&mut units);
    units
}

pub async fn handle(config: &fleetstack_config::Config, app: Option<String>) -> anyhow::Result<()> {
    println!("{}", "ユニット一覧を取得中...".blue());

    let provisioner = backend::build_provisioner(config).await?;
    let units = select_units(provisioner.collect_status().await?, app.as_deref());

    println!();
    if units.is_empty() {
        println!("{}", "ユニットはありません".dimmed());
        return Ok(());
    }

    println!(
        "{}",
        format!(
            "{:<24} {:<12} {:<12} {:<16} {:<20}",
            "UNIT", "STATE", "TYPE", "IP", "INSTANCE"
        )
        .bold()
    );
    println!("{}", "─".repeat(88).dimmed());
    for unit in &units {
        println!(
            "{:<24} {:<12} {:<12} {:<16} {:<20}",
            unit.name,
            colored_state(unit.state),
            unit.unit_type,
            if unit.ip.is_empty() { "-" } else { unit.ip.as_str() },
            unit.instance_id
        );
    }
    Ok(())
}
