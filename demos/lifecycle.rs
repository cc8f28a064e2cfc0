/// lifecycle - co-funded loan repaid to closure under controlled time
use chrono::{Duration, TimeZone, Utc};
use p2p_lending_rs::{
    LoanApplication, LoanStatus, Marketplace, MarketplaceConfig, Money, Rate, SafeTimeProvider,
    TimeSource, Uuid, WalletView,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init();

    println!("=== loan lifecycle ===\n");

    let time = SafeTimeProvider::new(TimeSource::Test(
        Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap(),
    ));
    let controller = time.test_control().unwrap();

    let market = Marketplace::new(MarketplaceConfig::standard())?;
    let borrower = Uuid::new_v4();
    let lender_a = Uuid::new_v4();
    let lender_b = Uuid::new_v4();

    let loan = market.apply_for_loan(
        LoanApplication::builder()
            .borrower(borrower)
            .amount(Money::from_major(100_000))
            .tenure_months(6)
            .rate(Rate::from_percentage(12))
            .purpose("small business")
            .credit_score(710)
            .build()?,
        &time,
    )?;
    println!("applied: status {}, emi {}", loan.status, loan.emi());

    market.approve(loan.id, &time)?;

    let first = market.fund(loan.id, lender_a, Money::from_major(60_000), &time)?;
    println!("lender a funded 60,000: status {}", first.status);
    let second = market.fund(loan.id, lender_b, Money::from_major(40_000), &time)?;
    println!("lender b funded 40,000: status {}", second.status);
    println!("borrower wallet: {}\n", market.balance(borrower));

    // the borrower tops up to cover interest
    market.deposit(borrower, Money::from_major(5_000), "salary", &time)?;

    loop {
        let current = market.loan(loan.id)?;
        if current.status == LoanStatus::Closed {
            break;
        }
        let line = match current.schedule.next_unpaid() {
            Some(line) => line.clone(),
            None => break,
        };

        controller.advance(Duration::days(30));
        let outcome = market.repay(loan.id, borrower, line.total_amount, &time)?;
        println!(
            "{} installment {} paid {}: a {} / b {}",
            time.now().format("%Y-%m-%d"),
            outcome.month,
            outcome.amount_paid,
            outcome.shares[0].amount,
            outcome.shares[1].amount
        );
    }

    let closed = market.loan(loan.id)?;
    println!("\nfinal status: {}", closed.status);
    println!("lender a received {}", market.balance(lender_a));
    println!("lender b received {}", market.balance(lender_b));
    println!("\n{}", WalletView::from_wallet(&market.wallet(borrower)?).to_json_pretty()?);

    let stats = market.stats();
    println!("\nclosed loans: {}", stats.closed_loans);

    Ok(())
}
