//! Power sequencing of hard resets.
use embassy_futures::select::{Either, select};
use tcpm_traits::{ControlError, DataRole, PortController, PowerRole, RpValue, SpecificationRevision, VbusLevel, VbusSource};

use crate::timers::{Timer, TimerType};

/// Return a sink to its default state after a hard reset.
///
/// The source is expected to drop VBUS to vSafe0V, and to restore it afterwards.
/// A source that is late in dropping VBUS is followed through its power cycle, as long as
/// VBUS is back within tSrcRecoverMax + tSrcTurnOn. A port that is left without VBUS is
/// reported as detached.
pub async fn sink_hard_reset<PORT: PortController, TIMER: Timer>(
    port: &mut PORT,
    revision: SpecificationRevision,
) -> Result<(), ControlError> {
    port.set_message_header(PowerRole::Sink, DataRole::Ufp, revision).await?;
    port.set_vconn(false).await?;

    let recover_millis = TimerType::SrcRecoverMax.millis() + TimerType::SrcTurnOn.millis();

    match select(
        port.wait_for_vbus(VbusLevel::Safe0V),
        TimerType::new::<TIMER>(TimerType::Safe0V),
    )
    .await
    {
        Either::First(result) => {
            result?;

            match select(port.wait_for_vbus(VbusLevel::Present), TIMER::after_millis(recover_millis)).await {
                Either::First(result) => result,
                Either::Second(_) => {
                    warn!("VBUS was not restored after hard reset");
                    Err(ControlError::Disconnected)
                }
            }
        }
        Either::Second(_) => {
            warn!("VBUS did not reach vSafe0V in time");

            let power_cycle = async {
                port.wait_for_vbus(VbusLevel::Safe0V).await?;
                port.wait_for_vbus(VbusLevel::Present).await
            };

            match select(power_cycle, TIMER::after_millis(recover_millis)).await {
                Either::First(result) => result,
                Either::Second(_) => match port.is_vbus_level(VbusLevel::Present).await? {
                    true => {
                        warn!("VBUS was never removed, continue");
                        Ok(())
                    }
                    false => {
                        warn!("VBUS was not restored after hard reset");
                        Err(ControlError::Disconnected)
                    }
                },
            }
        }
    }
}

/// Return a source to its default state after a hard reset.
///
/// VBUS is cycled through vSafe0V, and VCONN is restored if `vconn` is set.
pub async fn source_hard_reset<PORT: PortController, TIMER: Timer>(
    port: &mut PORT,
    rp_value: RpValue,
    vconn: bool,
    revision: SpecificationRevision,
) -> Result<(), ControlError> {
    port.set_vbus_source(VbusSource::Off).await?;
    port.set_vconn(false).await?;
    port.set_message_header(PowerRole::Source, DataRole::Dfp, revision).await?;

    TimerType::new::<TIMER>(TimerType::SrcRecover).await;

    port.set_vbus_source(VbusSource::Default).await?;
    port.set_rp_value(rp_value).await?;

    if vconn {
        port.set_vconn(true).await?;
    }

    TimerType::new::<TIMER>(TimerType::SourceTurnOnDelay).await;
    debug!("Source hard reset complete");

    Ok(())
}
