pub mod fixtures;
pub mod mock;

#[cfg(test)]
mod test_applier;
#[cfg(test)]
mod test_snapshot;
#[cfg(test)]
mod test_spool;
#[cfg(test)]
mod test_types;
