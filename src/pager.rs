//! `Pager` collaborator (spec §6): the page cache / pager is consumed, not
//! implemented, by this core. Only the interface it needs is declared here.

use crate::errors::EngineResult;
use crate::global::Pgno;

pub trait Pager {
    fn allocate_page(&mut self) -> EngineResult<Pgno>;
    fn free_page(&mut self, page: Pgno) -> EngineResult<()>;
    fn read_page(&mut self, page: Pgno) -> EngineResult<Vec<u8>>;
    fn write_page(&mut self, page: Pgno, data: &[u8]) -> EngineResult<()>;
    fn page_count(&self) -> Pgno;
    fn sync(&mut self) -> EngineResult<()>;
}
