use crate::RegistryError;

use alloy_primitives::{Bytes, U256};
use alloy_sol_types::SolValue;
use automation_abi::{pack_trigger, unpack_trigger, AbiError, Report};
use automation_primitives::{CheckResult, ReportedUpkeep, UpkeepId, WorkId};

/// Encodes check results into the report transmitted to the registry, and extracts the
/// reported upkeeps back out of a report.
#[derive(Debug, Default, Clone, Copy)]
pub struct Encoder;

impl Encoder {
    /// Encodes the results into an ABI report. The gas price fields of the report are the
    /// highest of the results.
    pub fn encode(&self, results: &[CheckResult]) -> Result<Bytes, RegistryError> {
        let mut report = Report::default();
        for result in results {
            report.fastGasWei = report.fastGasWei.max(result.fast_gas_wei);
            report.linkNative = report.linkNative.max(result.link_native);
            report.upkeepIds.push(result.upkeep_id.0);
            report.gasLimits.push(U256::from(result.gas_allocated));
            report.triggers.push(pack_trigger(&result.upkeep_id, &result.trigger)?);
            report.performDatas.push(result.perform_data.clone());
        }
        Ok(report.abi_encode().into())
    }

    /// Extracts the reported upkeeps of an ABI report.
    pub fn extract(&self, raw: &[u8]) -> Result<Vec<ReportedUpkeep>, RegistryError> {
        let report = Report::abi_decode(raw).map_err(AbiError::from)?;
        let len = report.upkeepIds.len();
        if report.gasLimits.len() != len ||
            report.triggers.len() != len ||
            report.performDatas.len() != len
        {
            return Err(RegistryError::InvalidReport("mismatched report lengths"));
        }

        report
            .upkeepIds
            .into_iter()
            .zip(report.triggers)
            .zip(report.performDatas)
            .map(|((id, trigger), perform_data)| {
                let upkeep_id = UpkeepId::from(id);
                let trigger = unpack_trigger(&upkeep_id, &trigger)?;
                let work_id = WorkId::new(&upkeep_id, &trigger);
                Ok::<_, RegistryError>(ReportedUpkeep { upkeep_id, trigger, work_id, perform_data })
            })
            .collect()
    }
}
