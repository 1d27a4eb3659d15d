use procure_core::approvals::LedgerSummary;
use procure_core::domain::approval::ApprovalEntry;
use procure_core::domain::order::{OrderId, OrderStatus};
use procure_db::connect_with_config;
use procure_db::repositories::{
    ApprovalLedgerRepository, OrderRepository, SqlApprovalLedgerRepository, SqlOrderRepository,
};
use serde::Serialize;

use crate::commands::{
    prepare, serialize_payload, CommandResult, EXIT_DB_CONNECTIVITY, EXIT_EXECUTION,
    EXIT_NOT_FOUND,
};

#[derive(Debug, Serialize)]
struct LedgerOutput {
    command: &'static str,
    status: &'static str,
    order_id: String,
    order_status: OrderStatus,
    summary: LedgerSummary,
    approvals: Vec<ApprovalEntry>,
}

pub fn run(order_id: &str) -> CommandResult {
    let (config, runtime) = match prepare("ledger") {
        Ok(prepared) => prepared,
        Err(result) => return result,
    };
    let order_id = OrderId(order_id.trim().to_string());

    let result = runtime.block_on(async {
        let pool = connect_with_config(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), EXIT_DB_CONNECTIVITY))?;

        let lookup = async {
            let order = SqlOrderRepository::new(pool.clone())
                .find_by_id(&order_id)
                .await
                .map_err(|error| ("db_query", error.to_string(), EXIT_EXECUTION))?
                .ok_or_else(|| {
                    ("not_found", format!("order `{}` was not found", order_id.0), EXIT_NOT_FOUND)
                })?;
            let approvals = SqlApprovalLedgerRepository::new(pool.clone())
                .list_for_order(&order_id)
                .await
                .map_err(|error| ("db_query", error.to_string(), EXIT_EXECUTION))?;
            Ok::<_, (&'static str, String, u8)>((order.status, approvals))
        }
        .await;

        pool.close().await;
        lookup
    });

    match result {
        Ok((order_status, approvals)) => CommandResult {
            exit_code: 0,
            output: serialize_payload(LedgerOutput {
                command: "ledger",
                status: "ok",
                order_id: order_id.0,
                order_status,
                summary: LedgerSummary::from_ledger(&approvals),
                approvals,
            }),
        },
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("ledger", error_class, message, exit_code)
        }
    }
}
