//! End-to-end scenarios driving indexes the way a table layer does.
//!
//! Each file covers one scenario, using deterministic inputs and the
//! in-memory table fixture.

#![cfg(test)]

mod helpers;

mod test_io_faults;
mod test_lenient_keys;
mod test_many_inserts;
mod test_name_tag;
mod test_navigation;
mod test_ndx_file;
mod test_reindex;
mod test_tag_capacity;
mod test_unique_id;
mod test_update;
