//! Demonstration of try regions, typed throws, and guarded acquisition.
//!
//! Three regions: one that acquires memory and a file and succeeds, one that
//! fills a large zeroed array, and one that deliberately fails to open a
//! missing file to show the catch path.

use std::io::Write;
use std::process::ExitCode;

use recoil::{alloc_bytes, alloc_zeroed, open_file, try_region};

fn main() -> ExitCode {
    recoil::init();

    let outcome = try_region(|| {
        let buffer = alloc_bytes(1024);
        let file = open_file("demo-output.txt", "w");
        // SAFETY: both handles were just produced by the acquisition
        // helpers and stay valid while this region is running.
        unsafe {
            let mut writer = file.as_ref();
            let _ = writeln!(writer, "hello from recoil {}", recoil::VERSION);
            std::ptr::write_bytes(buffer.as_ptr(), 0, 1024);
        }
        println!("ok: wrote demo-output.txt with a {}-byte scratch buffer", 1024);
    });
    if let Err(err) = outcome {
        err.print();
        return ExitCode::FAILURE;
    }

    let outcome = try_region(|| {
        let array = alloc_zeroed(1000, std::mem::size_of::<u32>());
        // SAFETY: 1000 zeroed u32 slots were just allocated, 16-byte aligned.
        unsafe {
            let slots = array.as_ptr().cast::<u32>();
            slots.add(999).write(42);
            assert_eq!(slots.add(999).read(), 42);
        }
        println!("ok: large zeroed array allocated and initialized");
    });
    if let Err(err) = outcome {
        err.print();
        return ExitCode::FAILURE;
    }

    let outcome = try_region(|| {
        open_file("nonexistent.txt", "r");
    });
    match outcome {
        Ok(()) => {
            println!("unexpected: nonexistent.txt opened");
            return ExitCode::FAILURE;
        }
        Err(err) => {
            print!("ok: caught expected error: ");
            err.print();
        }
    }

    println!("done");
    ExitCode::SUCCESS
}
