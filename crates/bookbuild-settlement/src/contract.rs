//! Contract rules every party checks before signing.
//!
//! The notary only guarantees single consumption. Whether a transition is a
//! legal auction closure or a legal bid allotment is decided here, by the
//! owner before signing and by the bidder before counter-signing.

use bookbuild_types::{
    AuctionRecord, AuctionState, BidRecord, BidStatus, BookbuildError, Command, LedgerRecord,
    Result, StateAndRef, Transition,
};
use rust_decimal::Decimal;

fn require(condition: bool, reason: impl FnOnce() -> String) -> Result<()> {
    if condition {
        Ok(())
    } else {
        Err(BookbuildError::InvalidTransition { reason: reason() })
    }
}

/// Rules for `CLOSE_AUCTION`.
///
/// - consumes exactly the auction's current revision, references nothing
/// - produces exactly one successor of the same auction, inactive and terminal,
///   carrying an allocation digest and otherwise unchanged
/// - signed by the owner alone
pub fn verify_close(transition: &Transition, consumed: &StateAndRef<AuctionRecord>) -> Result<()> {
    require(transition.command == Command::CloseAuction, || {
        format!("expected CLOSE_AUCTION, got {}", transition.command)
    })?;
    require(transition.inputs == [consumed.at], || {
        "closure must consume exactly the current auction revision".into()
    })?;
    require(transition.references.is_empty(), || {
        "closure takes no references".into()
    })?;

    let [LedgerRecord::Auction(closed)] = transition.outputs.as_slice() else {
        return Err(BookbuildError::InvalidTransition {
            reason: "closure must output exactly one auction".into(),
        });
    };
    let input = &consumed.record;
    require(input.is_open(), || format!("{} is not open", input.id))?;
    require(closed.id == input.id, || "auction identity changed".into())?;
    require(!closed.active && closed.state.is_terminal(), || {
        format!("closed auction must be inactive and terminal, got {}", closed.state)
    })?;
    require(closed.allocation_root.is_some(), || {
        "closed auction carries no allocation digest".into()
    })?;
    require(
        closed.item_name == input.item_name
            && closed.item_description == input.item_description
            && closed.capital_target == input.capital_target
            && closed.expiry == input.expiry
            && closed.owner == input.owner
            && closed.participants == input.participants,
        || "closure may only change active, state and allocation digest".into(),
    )?;
    require(transition.required_signers == [input.owner], || {
        "closure must be signed by the owner alone".into()
    })
}

/// Rules for `ALLOT_BID`.
///
/// - consumes exactly the bid's current revision, which is OPEN
/// - references exactly the closed auction revision, read-only: the auction is
///   never an input or an output
/// - the closed auction succeeded and is the bid's auction
/// - outputs the same offer, ALLOTTED at a positive clearing price
/// - signed by the owner and the bidder
pub fn verify_allot(
    transition: &Transition,
    consumed: &StateAndRef<BidRecord>,
    closed: &StateAndRef<AuctionRecord>,
) -> Result<()> {
    require(transition.command == Command::AllotBid, || {
        format!("expected ALLOT_BID, got {}", transition.command)
    })?;
    require(transition.inputs == [consumed.at], || {
        "allotment must consume exactly the current bid revision".into()
    })?;
    require(transition.references == [closed.at], || {
        "allotment must reference exactly the closed auction revision".into()
    })?;

    let [LedgerRecord::Bid(output)] = transition.outputs.as_slice() else {
        return Err(BookbuildError::InvalidTransition {
            reason: "allotment must output exactly one bid and never the auction".into(),
        });
    };
    let bid = &consumed.record;
    let auction = &closed.record;

    require(bid.status == BidStatus::Open, || format!("{} is {}", bid.id, bid.status))?;
    require(bid.auction == auction.id, || {
        format!("{} does not belong to {}", bid.id, auction.id)
    })?;
    require(
        !auction.active && auction.state == AuctionState::Success,
        || format!("{} has not closed successfully", auction.id),
    )?;
    require(bid.owner == auction.owner, || "bid owner is not the auction owner".into())?;
    require(output.same_offer(bid), || "allotment changes the offer".into())?;
    require(output.status == BidStatus::Allotted, || {
        format!("output status must be ALLOTTED, got {}", output.status)
    })?;
    require(
        output.clearing_price.is_some_and(|cp| cp > Decimal::ZERO),
        || "allotment carries no positive clearing price".into(),
    )?;

    let signers = &transition.required_signers;
    require(
        signers.len() == 2 && signers.contains(&bid.owner) && signers.contains(&bid.bidder),
        || "allotment must be signed by owner and bidder".into(),
    )
}
