mod common;

use std::collections::HashMap;

use common::{manager, stack_page};
use kernel_vm::{AddressSpace, MemoryManager, PageKindTag};
use proptest::prelude::*;

const SPACES: usize = 2;
const PAGES: usize = 6;

#[derive(Clone, Debug)]
enum Op {
    Write { space: usize, page: usize, value: u8 },
    Read { space: usize, page: usize },
    ClearAccessed { space: usize, page: usize },
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..SPACES, 0..PAGES, any::<u8>())
            .prop_map(|(space, page, value)| Op::Write { space, page, value }),
        (0..SPACES, 0..PAGES).prop_map(|(space, page)| Op::Read { space, page }),
        (0..SPACES, 0..PAGES).prop_map(|(space, page)| Op::ClearAccessed { space, page }),
    ]
}

fn check_invariants(mm: &MemoryManager, spaces: &[AddressSpace]) {
    let resident: usize = spaces.iter().map(|space| space.resident_pages()).sum();
    assert_eq!(mm.resident_frames(), resident);
    assert!(resident <= mm.capacity());
    for space in spaces {
        for page in 0..PAGES {
            let va = stack_page(page);
            if space.is_resident(va) {
                assert_ne!(space.page_kind(va), Some(PageKindTag::Swap));
            }
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn paging_preserves_content_and_frame_accounting(ops in prop::collection::vec(op(), 1..80)) {
        let mm = manager(3, SPACES * PAGES);
        let spaces: Vec<_> = (0..SPACES).map(|_| mm.create_address_space()).collect();
        let mut expected: HashMap<(usize, usize), u8> = HashMap::new();

        for op in ops {
            match op {
                Op::Write { space, page, value } => {
                    spaces[space].write_user(stack_page(page), &[value]).unwrap();
                    expected.insert((space, page), value);
                }
                Op::Read { space, page } => {
                    let mut buf = [0xff];
                    spaces[space].read_user(stack_page(page), &mut buf).unwrap();
                    // 从未写过的栈页读出来是零
                    let want = expected.get(&(space, page)).copied().unwrap_or(0);
                    prop_assert_eq!(buf[0], want);
                }
                Op::ClearAccessed { space, page } => {
                    spaces[space].clear_accessed(stack_page(page));
                }
            }
            check_invariants(&mm, &spaces);
        }

        drop(spaces);
        prop_assert_eq!(mm.resident_frames(), 0);
        prop_assert_eq!(mm.swap_slots_in_use(), 0);
    }
}
