//! Delete command
//!
//! 通过删除协调器提交请求，随后立即关闭协调器，使窗口内的请求被刷入存储。
//! 协调器由调用方创建，中断时也由调用方负责在关闭存储前停止它。

use colored::Colorize;

use crate::deletion::DeletionCoordinator;
use crate::interfaces::cli::CliError;
use crate::storage::DeleteRequest;

pub async fn delete_links(
    coordinator: &mut DeletionCoordinator,
    owner: String,
    keys: Vec<String>,
) -> Result<(), CliError> {
    let count = keys.len();

    let enqueued = coordinator
        .queue()
        .enqueue(DeleteRequest::new(owner, keys))
        .await;
    coordinator.shutdown().await?;
    enqueued?;

    let stats = coordinator.stats();
    if stats.failed_flushes > 0 {
        return Err(CliError::CommandError(
            "deletion failed, see log for details".to_string(),
        ));
    }

    if stats.applied_changes > 0 {
        println!("{} Deleted up to {} keys", "✓".bold().green(), count);
    } else {
        println!(
            "{} Nothing changed (keys unknown, not owned, or already deleted)",
            "ℹ".bold().blue()
        );
    }
    Ok(())
}
