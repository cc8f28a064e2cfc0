/// quick start - one loan from application to first repayment
use p2p_lending_rs::{
    LoanApplication, LoanView, Marketplace, MarketplaceConfig, Money, Rate, SafeTimeProvider,
    TimeSource, Uuid,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init();

    let time = SafeTimeProvider::new(TimeSource::System);
    let market = Marketplace::new(MarketplaceConfig::standard())?;

    let borrower = Uuid::new_v4();
    let lender = Uuid::new_v4();

    // apply for a 50,000 loan over a year
    let loan = market.apply_for_loan(
        LoanApplication::builder()
            .borrower(borrower)
            .amount(Money::from_major(50_000))
            .tenure_months(12)
            .rate(Rate::from_percentage(11))
            .purpose("education")
            .credit_score(742)
            .build()?,
        &time,
    )?;

    // approve and fund in full
    market.approve(loan.id, &time)?;
    market.fund(loan.id, lender, Money::from_major(50_000), &time)?;

    // pay the first installment
    let due = market.loan(loan.id)?.emi();
    market.repay(loan.id, borrower, due, &time)?;

    println!("{}", LoanView::from_loan(&market.loan(loan.id)?).to_json_pretty()?);
    println!("lender balance: {}", market.balance(lender));

    Ok(())
}
