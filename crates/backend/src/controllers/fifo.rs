//! The dual-clock FIFO buffering every stream.
//!
//! One design unit is generated per data width. Pointers are gray coded and
//! cross clock domains through two flip-flops, so `full` and `empty` are
//! conservative for a couple of cycles after the other side moves.
use std::sync::Arc;

use dfc_common::{error::Result, numbers::BitWidth};
use dfc_vhdl::{
    component::{ComponentDecl, ComponentPort, GenericDecl},
    entity::GENERATOR,
    variable::{vector_type, Mode},
};

/// Number of elements a FIFO holds.
pub const DEPTH: u32 = 512;
/// Free slots left when `almost_full` asserts.
pub const ALMOST_FULL_COUNT: i64 = 8;

const POINTER_WIDTH: u32 = 10;

pub fn name(width: BitWidth) -> String {
    format!("InferredBRAMFifo_{}", width)
}

pub fn declaration(width: BitWidth) -> Result<Arc<ComponentDecl>> {
    let port = |name: &str, mode, width| ComponentPort::try_new(name, mode, width);
    Ok(Arc::new(ComponentDecl::try_new(
        name(width),
        vec![GenericDecl::try_new(
            "ALMOST_FULL_COUNT",
            Some(ALMOST_FULL_COUNT),
        )?],
        vec![
            port("rst", Mode::In, 1)?,
            port("wclk", Mode::In, 1)?,
            port("rclk", Mode::In, 1)?,
            port("din", Mode::In, width)?,
            port("wen", Mode::In, 1)?,
            port("full", Mode::Out, 1)?,
            port("almost_full", Mode::Out, 1)?,
            port("ren", Mode::In, 1)?,
            port("dout", Mode::Out, width)?,
            port("empty", Mode::Out, 1)?,
        ],
    )?))
}

/// The complete design unit of the FIFO for one width.
pub fn code(width: BitWidth) -> String {
    let name = name(width);
    let high = POINTER_WIDTH - 1;
    format!(
        r#"-- This file was automatically generated by {generator}, DO NOT EDIT
library IEEE;
use IEEE.STD_LOGIC_1164.all;
use IEEE.STD_LOGIC_ARITH.all;
use IEEE.STD_LOGIC_UNSIGNED.all;

entity {name} is
  generic(
    ALMOST_FULL_COUNT : integer := {almost_full}
  );
  port(
    rst : in std_logic;
    wclk : in std_logic;
    rclk : in std_logic;
    din : in {data_type};
    wen : in std_logic;
    full : out std_logic;
    almost_full : out std_logic;
    ren : in std_logic;
    dout : out {data_type};
    empty : out std_logic
  );
end {name};

architecture Synthesized of {name} is
  type memory_t is array (0 to {last}) of {data_type};
  signal memory : memory_t;
  attribute syn_ramstyle : string;
  attribute syn_ramstyle of memory : signal is "block_ram";

  signal write_ptr : std_logic_vector({high} downto 0);
  signal write_gray : std_logic_vector({high} downto 0);
  signal read_ptr : std_logic_vector({high} downto 0);
  signal read_gray : std_logic_vector({high} downto 0);
  signal read_gray_sync0 : std_logic_vector({high} downto 0);
  signal read_gray_sync1 : std_logic_vector({high} downto 0);
  signal write_gray_sync0 : std_logic_vector({high} downto 0);
  signal write_gray_sync1 : std_logic_vector({high} downto 0);
  signal read_ptr_in_wclk : std_logic_vector({high} downto 0);
  signal write_ptr_in_rclk : std_logic_vector({high} downto 0);
  signal used : std_logic_vector({high} downto 0);
  signal full_int : std_logic;
  signal empty_int : std_logic;

  function to_gray(b : std_logic_vector) return std_logic_vector is
  begin
    return b xor ('0' & b(b'high downto 1));
  end to_gray;

  function from_gray(g : std_logic_vector) return std_logic_vector is
    variable b : std_logic_vector(g'range);
  begin
    b(g'high) := g(g'high);
    for i in g'high - 1 downto 0 loop
      b(i) := b(i + 1) xor g(i);
    end loop;
    return b;
  end from_gray;
begin
  read_ptr_in_wclk <= from_gray(read_gray_sync1);
  write_ptr_in_rclk <= from_gray(write_gray_sync1);
  used <= write_ptr - read_ptr_in_wclk;
  full_int <= '1' when used >= conv_std_logic_vector({depth}, {width_ptr}) else '0';
  empty_int <= '1' when write_ptr_in_rclk = read_ptr else '0';
  full <= full_int;
  empty <= empty_int;
  almost_full <= '1' when used >= conv_std_logic_vector({depth} - ALMOST_FULL_COUNT, {width_ptr}) else '0';

  write_side : process(wclk, rst)
  begin
    if (rst = '1') then
      write_ptr <= (others => '0');
      write_gray <= (others => '0');
      read_gray_sync0 <= (others => '0');
      read_gray_sync1 <= (others => '0');
    elsif (wclk'event and wclk = '1') then
      read_gray_sync0 <= read_gray;
      read_gray_sync1 <= read_gray_sync0;
      if (wen = '1' and full_int = '0') then
        memory(conv_integer(write_ptr({addr} downto 0))) <= din;
        write_ptr <= write_ptr + 1;
        write_gray <= to_gray(write_ptr + 1);
      end if;
    end if;
  end process;

  read_side : process(rclk, rst)
  begin
    if (rst = '1') then
      read_ptr <= (others => '0');
      read_gray <= (others => '0');
      write_gray_sync0 <= (others => '0');
      write_gray_sync1 <= (others => '0');
      dout <= (others => '0');
    elsif (rclk'event and rclk = '1') then
      write_gray_sync0 <= write_gray;
      write_gray_sync1 <= write_gray_sync0;
      if (ren = '1' and empty_int = '0') then
        dout <= memory(conv_integer(read_ptr({addr} downto 0)));
        read_ptr <= read_ptr + 1;
        read_gray <= to_gray(read_ptr + 1);
      end if;
    end if;
  end process;
end Synthesized;
"#,
        generator = GENERATOR,
        name = name,
        almost_full = ALMOST_FULL_COUNT,
        data_type = vector_type(width),
        last = DEPTH - 1,
        high = high,
        depth = DEPTH,
        width_ptr = POINTER_WIDTH,
        addr = POINTER_WIDTH - 2,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declaration_matches_code() -> Result<()> {
        let decl = declaration(24)?;
        assert_eq!(decl.port("din").map(|p| p.width()), Some(24));
        assert_eq!(decl.port("empty").map(|p| p.mode()), Some(Mode::Out));
        let code = code(24);
        assert!(code.contains("entity InferredBRAMFifo_24 is"));
        assert!(code.contains("din : in STD_LOGIC_VECTOR(23 downto 0);"));
        assert!(code.contains("type memory_t is array (0 to 511)"));
        assert!(code.contains("ALMOST_FULL_COUNT : integer := 8"));
        Ok(())
    }
}
